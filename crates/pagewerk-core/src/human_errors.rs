// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the people sending us documents.
//
// Every pipeline error is mapped to a plain-language message with a clear
// suggestion, so a transport layer can reply without inspecting variants.

use crate::error::PagewerkError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A busy machine or slow tool. Trying again may work.
    Transient,
    /// The user must change something (a setting, the file).
    ActionRequired,
    /// Retrying the same request will not help.
    Permanent,
}

/// A human-readable error with plain-language message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain summary (shown first).
    pub message: String,
    /// What the user should try next.
    pub suggestion: String,
    /// Whether the same request may succeed if repeated.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `PagewerkError` into a `HumanError`.
pub fn humanize_error(err: &PagewerkError) -> HumanError {
    match err {
        PagewerkError::SourceUnreadable { .. } | PagewerkError::PdfError(_) => HumanError {
            message: "We couldn't open this PDF.".into(),
            suggestion: "The file may be damaged or password-protected. Try opening it on a computer first, or send a different file.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        PagewerkError::Render { page, .. } => HumanError {
            message: format!("Page {} of this PDF couldn't be turned into an image.", page + 1),
            suggestion: "Try a lower quality setting. If it keeps failing, the page may be damaged.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        PagewerkError::ImageError(_) => HumanError {
            message: "There was a problem processing the page images.".into(),
            suggestion: "Try again with a lower quality setting.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        PagewerkError::UnknownPreset(name) => HumanError {
            message: "That enhancement style doesn't exist.".into(),
            suggestion: format!("Pick one of the listed styles instead of '{name}'."),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        PagewerkError::BackendUnavailable { .. }
        | PagewerkError::BackendFailure { .. }
        | PagewerkError::ValidationRejected(_) => HumanError {
            message: "Compression didn't work this time.".into(),
            suggestion: "Try again in a moment. Your original file is unchanged.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        PagewerkError::Timeout { .. } => HumanError {
            message: "Processing took too long.".into(),
            suggestion: "Large documents take longer. Try a lower quality setting, or split the document.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        PagewerkError::Cancelled => HumanError {
            message: "Processing was cancelled.".into(),
            suggestion: "Send the file again whenever you're ready.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        PagewerkError::Archive(_) => HumanError {
            message: "We couldn't pack the images into an archive.".into(),
            suggestion: "Try a lower quality setting so the images are smaller.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        PagewerkError::InvalidSettings { field, reason } => HumanError {
            message: format!("That {field} value isn't allowed."),
            suggestion: format!("Please choose a value within the allowed range ({reason})."),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        PagewerkError::Config(_) => HumanError {
            message: "The service is misconfigured.".into(),
            suggestion: "This isn't something you can fix. Please report it to the operator.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        PagewerkError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError {
                    message: "The file couldn't be found.".into(),
                    suggestion: "It may have expired. Please send the file again.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Try again. If this keeps happening, the server's storage may be full.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        PagewerkError::Serialization(_) => HumanError {
            message: "We had an internal data problem.".into(),
            suggestion: "Try again. If this keeps happening, please report it.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_source_is_permanent() {
        let err = PagewerkError::SourceUnreadable {
            path: "/tmp/in.pdf".into(),
            reason: "invalid file header".into(),
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Permanent);
        assert!(!human.retriable);
    }

    #[test]
    fn render_error_names_one_based_page() {
        let err = PagewerkError::Render {
            page: 4,
            reason: "pixmap allocation failed".into(),
        };
        assert!(humanize_error(&err).message.contains("Page 5"));
    }

    #[test]
    fn invalid_setting_is_action_required() {
        let err = PagewerkError::InvalidSettings {
            field: "contrast",
            reason: "0.1 to 10".into(),
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(human.message.contains("contrast"));
    }

    #[test]
    fn timeout_is_transient() {
        let human = humanize_error(&PagewerkError::Timeout { seconds: 120 });
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }
}
