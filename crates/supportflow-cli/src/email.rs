use std::collections::HashMap;
use std::process::Command;

use supportflow_common::{Error, Result};
use supportflow_config::{EmailRepliesConfig, ImapConfig};
use tracing::{debug, info};

pub const DEFAULT_INBOX: &str = "INBOX";
pub const DEFAULT_ARCHIVE: &str = "SF_ARCHIVE";

/// IMAP mailbox the replies are fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImapDetails {
    pub host: String,
    pub username: String,
    pub password: String,
    /// Folder new replies arrive in.
    pub inbox: String,
    /// Folder processed replies are moved to.
    pub archive: String,
}

impl Default for ImapDetails {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            inbox: DEFAULT_INBOX.to_string(),
            archive: DEFAULT_ARCHIVE.to_string(),
        }
    }
}

/// Last chance to rewrite connection details before they are used.
pub trait ConnectionDetailsFilter {
    fn filter(&self, details: ImapDetails) -> ImapDetails;
}

pub struct NoOverride;

impl ConnectionDetailsFilter for NoOverride {
    fn filter(&self, details: ImapDetails) -> ImapDetails {
        details
    }
}

/// Replaces every field the config file's `imap` section sets.
pub struct ConfigOverride<'a> {
    overrides: &'a ImapConfig,
}

impl<'a> ConfigOverride<'a> {
    pub fn new(overrides: &'a ImapConfig) -> Self {
        Self { overrides }
    }
}

impl ConnectionDetailsFilter for ConfigOverride<'_> {
    fn filter(&self, details: ImapDetails) -> ImapDetails {
        let pick = |configured: &Option<String>, current: String| {
            configured.clone().unwrap_or(current)
        };
        ImapDetails {
            host: pick(&self.overrides.host, details.host),
            username: pick(&self.overrides.username, details.username),
            password: pick(&self.overrides.password, details.password),
            inbox: pick(&self.overrides.inbox, details.inbox),
            archive: pick(&self.overrides.archive, details.archive),
        }
    }
}

/// Config-file override when the `imap` section sets anything, otherwise a no-op.
pub fn details_filter(overrides: &ImapConfig) -> Box<dyn ConnectionDetailsFilter + '_> {
    let configured = [
        &overrides.host,
        &overrides.username,
        &overrides.password,
        &overrides.inbox,
        &overrides.archive,
    ]
    .iter()
    .any(|field| field.is_some());

    if configured {
        Box::new(ConfigOverride::new(overrides))
    } else {
        Box::new(NoOverride)
    }
}

/// Fetches replies from the mailbox and appends them to their threads.
pub trait EmailReplies {
    /// Returns a human readable summary on success.
    fn download_and_process(&self, details: &ImapDetails) -> Result<String>;
}

/// Delegates to an external program, handing it the details through the environment.
pub struct CommandEmailReplies {
    command: Option<String>,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl CommandEmailReplies {
    pub fn from_config(config: &EmailRepliesConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
        }
    }
}

impl EmailReplies for CommandEmailReplies {
    fn download_and_process(&self, details: &ImapDetails) -> Result<String> {
        let Some(program) = self.command.as_deref() else {
            return Err(Error::EmailReplies(
                "no email replies service configured".into(),
            ));
        };

        info!("running email replies service '{program}' for {}", details.host);
        let output = Command::new(program)
            .args(&self.args)
            .envs(&self.env)
            .env("SUPPORTFLOW_IMAP_HOST", &details.host)
            .env("SUPPORTFLOW_IMAP_USERNAME", &details.username)
            .env("SUPPORTFLOW_IMAP_PASSWORD", &details.password)
            .env("SUPPORTFLOW_IMAP_INBOX", &details.inbox)
            .env("SUPPORTFLOW_IMAP_ARCHIVE", &details.archive)
            .output()
            .map_err(|e| Error::EmailReplies(format!("failed to run '{program}': {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!("email replies service exited with {}", output.status);

        if output.status.success() {
            if stdout.is_empty() {
                Ok("Email replies processed.".to_string())
            } else {
                Ok(stdout)
            }
        } else if stderr.is_empty() {
            Err(Error::EmailReplies(format!("'{program}' {}", output.status)))
        } else {
            Err(Error::EmailReplies(stderr))
        }
    }
}

/// Applies the filter, then hands the details to the service.
pub fn download_and_process_email_replies(
    details: ImapDetails,
    filter: &dyn ConnectionDetailsFilter,
    service: &dyn EmailReplies,
) -> Result<String> {
    let details = filter.filter(details);
    service.download_and_process(&details)
}

#[cfg(test)]
mod tests {
    use super::{
        CommandEmailReplies, ConfigOverride, EmailReplies, ImapDetails, NoOverride,
        details_filter, download_and_process_email_replies,
    };
    use std::cell::RefCell;
    use supportflow_common::{Error, Result};
    use supportflow_config::{EmailRepliesConfig, ImapConfig};

    struct RecordingService {
        seen: RefCell<Option<ImapDetails>>,
        result: std::result::Result<String, String>,
    }

    impl EmailReplies for RecordingService {
        fn download_and_process(&self, details: &ImapDetails) -> Result<String> {
            *self.seen.borrow_mut() = Some(details.clone());
            self.result.clone().map_err(Error::EmailReplies)
        }
    }

    #[test]
    fn defaults_use_standard_folders() {
        let details = ImapDetails::default();
        assert_eq!(details.inbox, "INBOX");
        assert_eq!(details.archive, "SF_ARCHIVE");
        assert!(details.host.is_empty());
    }

    #[test]
    fn config_override_replaces_only_configured_fields() {
        let overrides = ImapConfig {
            password: Some("from-secret-file".into()),
            archive: Some("Done".into()),
            ..ImapConfig::default()
        };
        let service = RecordingService {
            seen: RefCell::new(None),
            result: Ok("Processed 3 replies".into()),
        };
        let details = ImapDetails {
            host: "imap.example.com".into(),
            username: "help@example.com".into(),
            ..ImapDetails::default()
        };

        let message = download_and_process_email_replies(
            details,
            &ConfigOverride::new(&overrides),
            &service,
        )
        .expect("service succeeds");

        assert_eq!(message, "Processed 3 replies");
        let seen = service.seen.borrow().clone().expect("service was called");
        assert_eq!(seen.host, "imap.example.com");
        assert_eq!(seen.username, "help@example.com");
        assert_eq!(seen.password, "from-secret-file");
        assert_eq!(seen.inbox, "INBOX");
        assert_eq!(seen.archive, "Done");
    }

    #[test]
    fn details_filter_is_noop_without_overrides() {
        let details = ImapDetails {
            host: "imap.example.com".into(),
            ..ImapDetails::default()
        };
        let config = ImapConfig::default();
        let filter = details_filter(&config);
        assert_eq!(filter.filter(details.clone()), details);

        let overrides = ImapConfig {
            host: Some("secret.example.com".into()),
            ..ImapConfig::default()
        };
        assert_eq!(
            details_filter(&overrides).filter(details).host,
            "secret.example.com"
        );
    }

    #[test]
    fn service_failure_message_is_propagated_verbatim() {
        let service = RecordingService {
            seen: RefCell::new(None),
            result: Err("Could not connect to IMAP server".into()),
        };

        let err = download_and_process_email_replies(ImapDetails::default(), &NoOverride, &service)
            .expect_err("service fails");
        assert_eq!(err.to_string(), "Could not connect to IMAP server");
    }

    #[test]
    fn command_service_requires_a_command() {
        let service = CommandEmailReplies::from_config(&EmailRepliesConfig::default());
        let err = service
            .download_and_process(&ImapDetails::default())
            .expect_err("no command configured");
        assert_eq!(err.to_string(), "no email replies service configured");
    }

    #[cfg(unix)]
    #[test]
    fn command_service_reports_stdout_and_passes_details() {
        let service = CommandEmailReplies::from_config(&EmailRepliesConfig {
            command: Some("sh".into()),
            args: vec![
                "-c".into(),
                "echo \"fetched from $SUPPORTFLOW_IMAP_HOST/$SUPPORTFLOW_IMAP_INBOX\"".into(),
            ],
            env: Default::default(),
        });
        let details = ImapDetails {
            host: "imap.example.com".into(),
            ..ImapDetails::default()
        };

        let message = service.download_and_process(&details).expect("command succeeds");
        assert_eq!(message, "fetched from imap.example.com/INBOX");
    }

    #[cfg(unix)]
    #[test]
    fn command_service_failure_uses_stderr() {
        let service = CommandEmailReplies::from_config(&EmailRepliesConfig {
            command: Some("sh".into()),
            args: vec!["-c".into(), "echo 'login rejected' >&2; exit 3".into()],
            env: Default::default(),
        });

        let err = service
            .download_and_process(&ImapDetails::default())
            .expect_err("command fails");
        assert_eq!(err.to_string(), "login rejected");
    }
}
