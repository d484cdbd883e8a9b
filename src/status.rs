//! sentinelmc/src/status.rs
//! The Status JSON document shape: `{version, players, description, favicon?}`.

use serde::Serialize;

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: Version,
    pub players: Players,
    pub description: Description,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

#[derive(Serialize)]
pub struct Version {
    pub name: String,
    pub protocol: i32,
}

#[derive(Serialize)]
pub struct Players {
    pub max: i32,
    pub online: i32,
    pub sample: Vec<PlayerSample>,
}

#[derive(Serialize)]
pub struct PlayerSample {
    pub name: String,
    pub id: String,
}

#[derive(Serialize)]
pub struct Description {
    pub text: String,
}

impl StatusResponse {
    /// Builds a status document with the (always empty, in this core)
    /// `sample` array and no favicon.
    pub fn new(
        description_text: impl Into<String>,
        version_name: impl Into<String>,
        version_protocol: i32,
        players_online: i32,
        players_max: i32,
    ) -> Self {
        Self {
            version: Version {
                name: version_name.into(),
                protocol: version_protocol,
            },
            players: Players {
                max: players_max,
                online: players_online,
                sample: Vec::new(),
            },
            description: Description {
                text: description_text.into(),
            },
            favicon: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omits_favicon_when_absent() {
        let status = StatusResponse::new("[stopped]", "1.17.1", 756, 0, 20);
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("favicon").is_none());
        assert_eq!(json["description"]["text"], "[stopped]");
        assert_eq!(json["players"]["online"], 0);
        assert_eq!(json["players"]["max"], 20);
        assert_eq!(json["version"]["name"], "1.17.1");
        assert_eq!(json["version"]["protocol"], 756);
        assert_eq!(json["players"]["sample"].as_array().unwrap().len(), 0);
    }
}
