/// Application identifier carried by the controller's signature.
pub const CONTROLLER_APPLICATION_ID: &str = "com.paniclock.app";

/// Service identifier of the privileged helper.
pub const HELPER_SERVICE_ID: &str = "com.paniclock.helper";

/// Signing authority (team) both binaries are signed by.
pub const SIGNING_AUTHORITY_ID: &str = "6UA5KMSP89";

/// Socket the helper listens on unless configured otherwise.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/com.paniclock.helper.sock";

/// Where the installed helper binary lives.
pub const INSTALLED_HELPER_PATH: &str = "/Library/PrivilegedHelperTools/com.paniclock.helper";

/// Launch daemon registration for the helper.
pub const INSTALLED_LAUNCHD_PLIST: &str = "/Library/LaunchDaemons/com.paniclock.helper.plist";
