use async_trait::async_trait;

/// Unprivileged actions the controller can take on its own.
#[async_trait]
pub trait LocalActions: Send + Sync {
    /// Lock the screen without touching biometric settings.
    async fn lock_screen_only(&self) -> anyhow::Result<()>;

    /// Make sure the session requires a password immediately after locking.
    async fn ensure_immediate_lock(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn play_confirmation(&self) -> anyhow::Result<()>;
}

/// User preferences, read once per invocation.
pub trait SettingsSource: Send + Sync {
    fn confirmation_sound_enabled(&self) -> bool;
}
