use std::sync::Arc;

use tracing::info;

use crate::auth::jwt::JwtKeys;
use crate::auth::throttle::AttemptLimiter;
use crate::auth::AuthGate;
use crate::backup::BackupManager;
use crate::config::AppConfig;
use crate::crypto::FieldCipher;
use crate::notify::{DisabledNotifier, Notifier, SmtpNotifier};
use crate::repairs::SecureStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<SecureStore>,
    pub auth: Arc<AuthGate>,
    pub api_limiter: Arc<AttemptLimiter>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Wire everything from configuration, using SMTP when credentials are
    /// present.
    pub fn init(config: AppConfig) -> anyhow::Result<Self> {
        let notifier: Arc<dyn Notifier> = match &config.smtp {
            Some(smtp) => {
                info!(host = %smtp.host, port = smtp.port, "smtp notifications enabled");
                Arc::new(SmtpNotifier::new(smtp)?)
            }
            None => {
                info!("EMAIL_USER/EMAIL_PASS not set; notifications disabled");
                Arc::new(DisabledNotifier)
            }
        };
        Self::from_parts(config, notifier)
    }

    pub fn from_parts(config: AppConfig, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        let cipher = FieldCipher::new(&config.crypto.encryption_key);
        let backups = BackupManager::new(&config.storage.backup_dir, config.storage.max_backups);
        let store = SecureStore::open(&config.storage.data_file, cipher, backups)?;

        let limits = &config.rate_limit;
        let auth = AuthGate::new(
            JwtKeys::from_config(&config.jwt),
            config.admin.clone(),
            AttemptLimiter::new("login", limits.login_max_attempts, limits.window),
        );
        let api_limiter = AttemptLimiter::new("api", limits.max_requests, limits.window);

        Ok(Self {
            store: Arc::new(store),
            auth: Arc::new(auth),
            api_limiter: Arc::new(api_limiter),
            notifier,
            config: Arc::new(config),
        })
    }
}
