use std::net::SocketAddr;

const HUB_API_ADDR: &str = "HUB_API_ADDR";

pub fn get_api_addr(default: SocketAddr) -> SocketAddr {
    let addr_from_env = std::env::var(HUB_API_ADDR);
    addr_from_env.map_or(default, |res| res.parse().unwrap_or(default))
}

const HUB_API_TOKEN: &str = "HUB_API_TOKEN";

pub fn get_api_token() -> Option<String> {
    std::env::var(HUB_API_TOKEN).ok().filter(|t| !t.is_empty())
}

const HUB_MQTT_USERNAME: &str = "HUB_MQTT_USERNAME";

pub fn get_mqtt_username() -> Option<String> {
    std::env::var(HUB_MQTT_USERNAME).ok()
}

const HUB_MQTT_PASSWORD: &str = "HUB_MQTT_PASSWORD";

pub fn get_mqtt_password() -> Option<String> {
    std::env::var(HUB_MQTT_PASSWORD).ok()
}
