pub const TOPIC_WEATHER_STATE: &str = "sprinkler/weather/state";
pub const TOPIC_CONTROLLER_STATUS: &str = "sprinkler/controller/status";

pub const TOPIC_CMD_WEATHER_CHECK: &str = "sprinkler/cmnd/weather/check";
