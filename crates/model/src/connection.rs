use serde::Deserialize;

/// Connection descriptor for a relational store.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ConnInfo {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

fn default_port() -> u16 {
    3306
}

impl ConnInfo {
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}
