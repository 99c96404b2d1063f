use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub cloudinary: Option<CloudinaryConfig>,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub upload_preset: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET is not set"))?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let request_timeout_secs = env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);
        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(5 * 1024 * 1024);

        let cloudinary = match (
            env::var("CLOUDINARY_CLOUD_NAME"),
            env::var("CLOUDINARY_UPLOAD_PRESET"),
        ) {
            (Ok(cloud_name), Ok(upload_preset)) => Some(CloudinaryConfig {
                cloud_name,
                upload_preset,
            }),
            _ => None,
        };

        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            request_timeout_secs,
            max_upload_bytes,
            cloudinary,
        })
    }

    /// Body limit for the whole router. Leaves room for several images plus form fields.
    pub fn body_limit(&self) -> usize {
        self.max_upload_bytes * 6
    }
}
