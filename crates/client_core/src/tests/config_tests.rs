use super::*;

fn no_env(_key: &str) -> Option<String> {
    None
}

#[test]
fn defaults_use_five_second_reconnect() {
    let settings = ClientSettings::from_sources(None, no_env);
    assert_eq!(settings, ClientSettings::default());
    assert_eq!(settings.reconnect_delay, Duration::from_secs(5));
}

#[test]
fn file_values_accept_strings_and_integers() {
    let raw = r#"
        broker_url = "wss://chat.example.com/ws"
        api_base_url = "https://chat.example.com/api/"
        reconnect_delay_secs = 2
        heart_beat = "0,0"
    "#;
    let settings = ClientSettings::from_sources(Some(raw), no_env);
    assert_eq!(settings.broker_url, "wss://chat.example.com/ws");
    assert_eq!(settings.api_base_url, "https://chat.example.com/api");
    assert_eq!(settings.reconnect_delay, Duration::from_secs(2));
    assert_eq!(settings.heart_beat, HeartBeat::default());
}

#[test]
fn environment_overrides_file() {
    let raw = r#"broker_url = "ws://file/ws""#;
    let settings = ClientSettings::from_sources(Some(raw), |key| match key {
        "CHAT__BROKER_URL" => Some("ws://env/ws".to_string()),
        "CHAT__RECONNECT_DELAY_SECS" => Some("9".to_string()),
        _ => None,
    });
    assert_eq!(settings.broker_url, "ws://env/ws");
    assert_eq!(settings.reconnect_delay, Duration::from_secs(9));
}

#[test]
fn invalid_values_keep_previous_setting() {
    let settings = ClientSettings::from_sources(
        Some("reconnect_delay_secs = \"soon\"\nheart_beat = \"fast\""),
        no_env,
    );
    assert_eq!(settings.reconnect_delay, Duration::from_secs(5));
    assert_eq!(settings.heart_beat, HeartBeat::from_millis(10_000, 10_000));
}

#[test]
fn unreadable_file_falls_back_to_defaults() {
    let settings = ClientSettings::from_sources(Some("this is = = not toml"), no_env);
    assert_eq!(settings, ClientSettings::default());
}
