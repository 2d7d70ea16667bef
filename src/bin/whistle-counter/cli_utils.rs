use anyhow::Result;
use whistle_counter::audio;
use whistle_counter::config::AppConfig;
use whistle_counter::listener::SourceSpec;

/// Comma-separated device names that replace real enumeration (tests, CI).
const TEST_DEVICES_ENV: &str = "WHISTLE_COUNTER_TEST_DEVICES";

pub(crate) fn list_input_devices() -> Result<()> {
    let devices = if let Ok(raw) = std::env::var(TEST_DEVICES_ENV) {
        parse_device_list(&raw)
    } else {
        audio::Recorder::list_devices().unwrap_or_else(|err| {
            eprintln!("Failed to list audio input devices: {err}");
            Vec::new()
        })
    };

    if devices.is_empty() {
        println!("No audio input devices detected.");
    } else {
        println!("Available audio input devices:");
        for name in devices {
            println!("  - {name}");
        }
    }
    Ok(())
}

fn parse_device_list(raw: &str) -> Vec<String> {
    raw.trim()
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// WAV input wins when given; otherwise listen on the chosen microphone.
pub(crate) fn source_spec(config: &AppConfig) -> SourceSpec {
    match &config.input_wav {
        Some(path) => SourceSpec::Wav(path.clone()),
        None => SourceSpec::Microphone {
            device: config.input_device.clone(),
            channel_capacity: config.channel_capacity,
        },
    }
}
