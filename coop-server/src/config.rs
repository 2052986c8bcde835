use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_attempts: u32,
    pub room_code_length: usize,
    pub room_timeout_minutes: u64,
    pub connection_timeout_seconds: u64,
    pub word_list_path: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("Invalid PORT"),
            max_attempts: env::var("MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("Invalid MAX_ATTEMPTS"),
            room_code_length: env::var("ROOM_CODE_LENGTH")
                .unwrap_or_else(|_| "6".to_string())
                .parse()
                .expect("Invalid ROOM_CODE_LENGTH"),
            room_timeout_minutes: env::var("ROOM_TIMEOUT_MINUTES")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .expect("Invalid ROOM_TIMEOUT_MINUTES"),
            connection_timeout_seconds: env::var("CONNECTION_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .expect("Invalid CONNECTION_TIMEOUT_SECONDS"),
            word_list_path: env::var("WORD_LIST_PATH").ok(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
