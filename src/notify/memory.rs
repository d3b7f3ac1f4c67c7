use std::sync::Mutex;

use async_trait::async_trait;

use super::{Email, Notifier};

/// Keeps sent emails in memory. Can be told to fail every send.
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Email>>,
    fail: bool,
}

impl MemoryNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("smtp unreachable");
        }
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("notifier state poisoned"))?
            .push(email.clone());
        Ok(())
    }
}
