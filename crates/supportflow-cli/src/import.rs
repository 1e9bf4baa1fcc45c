use std::fmt;

use supportflow_common::{
    EntityKind, IMPORT_MARKER_KEY, NewMessage, NewThread, Result, ThreadId, Visibility,
};
use supportflow_db::{LegacyMessage, LegacySource, LegacyThread, TicketStore};
use tracing::{debug, info, warn};

use crate::normalize::{ContentNormalizer, Verbatim};

/// Legacy message type that maps to a private note.
const NOTE_MESSAGE_TYPE: &str = "note";

pub struct ImportOptions {
    /// Prepended to the legacy state to form the local status.
    pub status_prefix: String,
    pub dry_run: bool,
}

/// What happened to one legacy thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadOutcome {
    Created {
        legacy_id: i64,
        subject: String,
        replies: usize,
    },
    WouldCreate {
        legacy_id: i64,
        subject: String,
        replies: usize,
    },
    Skipped {
        legacy_id: i64,
        subject: String,
    },
    Failed {
        legacy_id: i64,
        subject: String,
        error: String,
    },
}

impl fmt::Display for ThreadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created {
                legacy_id,
                subject,
                replies,
            } => write!(f, "Created: #{legacy_id} '{subject}' with {replies} replies"),
            Self::WouldCreate {
                legacy_id,
                subject,
                replies,
            } => write!(f, "Would create: #{legacy_id} '{subject}' with {replies} replies"),
            Self::Skipped { legacy_id, subject } => {
                write!(f, "Skipped: #{legacy_id} '{subject}' already exists")
            }
            Self::Failed {
                legacy_id,
                subject,
                error,
            } => write!(f, "Failed: #{legacy_id} '{subject}': {error}"),
        }
    }
}

#[derive(Debug)]
pub struct ImportReport {
    pub threads_created: usize,
    pub threads_skipped: usize,
    pub threads_failed: usize,
    pub messages_imported: usize,
    pub messages_failed: usize,
    pub errors: Vec<String>,
    pub dry_run: bool,
}

impl ImportReport {
    fn new(dry_run: bool) -> Self {
        Self {
            threads_created: 0,
            threads_skipped: 0,
            threads_failed: 0,
            messages_imported: 0,
            messages_failed: 0,
            errors: Vec::new(),
            dry_run,
        }
    }

    fn record(&mut self, outcome: &ThreadOutcome) {
        match outcome {
            ThreadOutcome::Created { .. } | ThreadOutcome::WouldCreate { .. } => {
                self.threads_created += 1
            }
            ThreadOutcome::Skipped { .. } => self.threads_skipped += 1,
            ThreadOutcome::Failed {
                legacy_id, error, ..
            } => {
                self.threads_failed += 1;
                self.errors.push(format!("thread #{legacy_id}: {error}"));
            }
        }
    }

    pub fn final_line(&self) -> String {
        if self.dry_run {
            format!(
                "Dry run complete. Would import {} threads.",
                self.threads_created
            )
        } else {
            format!("All done! Imported {} threads.", self.threads_created)
        }
    }

    pub fn print_summary(&self) {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        println!("Import Report{mode}");
        println!("─────────────");
        println!(
            "  Threads:  {} imported, {} skipped, {} failed",
            self.threads_created, self.threads_skipped, self.threads_failed
        );
        println!(
            "  Messages: {} imported, {} failed",
            self.messages_imported, self.messages_failed
        );
        if !self.errors.is_empty() {
            println!("  Errors ({}):", self.errors.len());
            for e in &self.errors {
                println!("    - {e}");
            }
        }
    }
}

/// Copies legacy threads and messages into a ticket store, skipping threads
/// that already carry an import marker.
pub struct Importer<'a> {
    store: &'a dyn TicketStore,
    normalizer: &'a dyn ContentNormalizer,
    options: ImportOptions,
}

impl<'a> Importer<'a> {
    pub fn new(store: &'a dyn TicketStore, options: ImportOptions) -> Self {
        Self {
            store,
            normalizer: &Verbatim,
            options,
        }
    }

    pub fn with_normalizer(mut self, normalizer: &'a dyn ContentNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Runs the batch. Fatal errors (connection, query, config) abort; any
    /// other error fails that one thread and the batch continues.
    pub async fn run(
        &self,
        source: &mut dyn LegacySource,
        on_progress: &mut dyn FnMut(&ThreadOutcome),
    ) -> Result<ImportReport> {
        let mut report = ImportReport::new(self.options.dry_run);

        let threads = source.list_threads().await?;
        info!("importing {} legacy threads", threads.len());

        for legacy in &threads {
            let outcome = match self.import_thread(source, legacy, &mut report).await {
                Ok(outcome) => outcome,
                Err(e) if !e.is_fatal() => {
                    warn!("failed to import legacy thread #{}: {e}", legacy.id);
                    ThreadOutcome::Failed {
                        legacy_id: legacy.id,
                        subject: legacy.subject.clone(),
                        error: e.to_string(),
                    }
                }
                Err(e) => return Err(e),
            };
            on_progress(&outcome);
            report.record(&outcome);
        }

        info!(
            created = report.threads_created,
            skipped = report.threads_skipped,
            failed = report.threads_failed,
            "import finished"
        );
        Ok(report)
    }

    async fn import_thread(
        &self,
        source: &mut dyn LegacySource,
        legacy: &LegacyThread,
        report: &mut ImportReport,
    ) -> Result<ThreadOutcome> {
        let marker = legacy.id.to_string();
        if self
            .store
            .find_by_marker(EntityKind::Thread, IMPORT_MARKER_KEY, &marker)?
            .is_some()
        {
            debug!("legacy thread #{} already imported", legacy.id);
            return Ok(ThreadOutcome::Skipped {
                legacy_id: legacy.id,
                subject: legacy.subject.clone(),
            });
        }

        let messages = source.list_messages(legacy.id).await?;

        if self.options.dry_run {
            return Ok(ThreadOutcome::WouldCreate {
                legacy_id: legacy.id,
                subject: legacy.subject.clone(),
                replies: messages.len(),
            });
        }

        let new_thread = NewThread {
            subject: legacy.subject.clone(),
            status: format!("{}{}", self.options.status_prefix, legacy.state),
            created_at: legacy.date,
        };
        let thread_id = self.store.create_thread(&new_thread)?;

        if let Err(e) = self.store.set_thread_respondents(thread_id, &legacy.email) {
            warn!("failed to set respondents on thread {thread_id}: {e}");
            report
                .errors
                .push(format!("thread #{}: respondents: {e}", legacy.id));
        }

        let mut replies = 0;
        for message in &messages {
            if self.import_message(thread_id, legacy.id, message, report) {
                replies += 1;
            }
        }

        // An unmarked thread would be imported again by the next run.
        if let Err(e) =
            self.store
                .set_marker(EntityKind::Thread, thread_id.get(), IMPORT_MARKER_KEY, &marker)
        {
            warn!("failed to mark thread {thread_id}, removing it: {e}");
            if let Err(cleanup) = self.store.delete_thread(thread_id) {
                warn!("failed to remove unmarked thread {thread_id}: {cleanup}");
            }
            report.messages_imported = report.messages_imported.saturating_sub(replies);
            return Err(e);
        }

        Ok(ThreadOutcome::Created {
            legacy_id: legacy.id,
            subject: legacy.subject.clone(),
            replies,
        })
    }

    /// Returns whether the message was created. Failures are recorded and skipped.
    fn import_message(
        &self,
        thread_id: ThreadId,
        legacy_thread_id: i64,
        message: &LegacyMessage,
        report: &mut ImportReport,
    ) -> bool {
        let new_message = NewMessage {
            author: message.email.clone(),
            author_email: message.email.clone(),
            visibility: visibility_for(&message.message_type),
            created_at: message.date,
        };
        let content = self.normalizer.normalize(&message.content);

        let message_id = match self.store.add_message(thread_id, &content, &new_message) {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    "failed to import legacy message #{} of thread #{legacy_thread_id}: {e}",
                    message.id
                );
                report.messages_failed += 1;
                report.errors.push(format!(
                    "thread #{legacy_thread_id}: message #{}: {e}",
                    message.id
                ));
                return false;
            }
        };

        if let Err(e) = self.store.set_marker(
            EntityKind::Message,
            message_id.get(),
            IMPORT_MARKER_KEY,
            &message.id.to_string(),
        ) {
            report.errors.push(format!(
                "thread #{legacy_thread_id}: message #{} import marker: {e}",
                message.id
            ));
        }

        report.messages_imported += 1;
        true
    }
}

pub fn visibility_for(message_type: &str) -> Visibility {
    if message_type == NOTE_MESSAGE_TYPE {
        Visibility::Private
    } else {
        Visibility::Public
    }
}
