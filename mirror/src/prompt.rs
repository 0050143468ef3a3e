//! Operator confirmation at the pipeline's checkpoints.
//!
//! The pipeline never reads the terminal directly. It asks a [`Confirmer`],
//! which is either a fixed policy (auto-approve, auto-deny) or an interactive
//! prompt over any reader/writer pair.

use log::{info, warn};
use std::cell::RefCell;
use std::fmt;
use std::io::{BufRead, Write};

/// The points at which the pipeline asks for a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Checkpoint {
    /// Before any download, after the artifact list is resolved.
    Discovery,
    /// After a transfer failed; affirming retries the artifact.
    TransferFailure,
    /// Before an existing public tree is replaced.
    Overwrite,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Discovery => "discovery",
            Self::TransferFailure => "transfer failure",
            Self::Overwrite => "overwrite",
        };
        f.write_str(label)
    }
}

/// Decides whether the pipeline may proceed past a checkpoint.
#[cfg_attr(test, mockall::automock)]
pub trait Confirmer {
    /// Return `true` to proceed, `false` to decline.
    fn confirm(&self, checkpoint: Checkpoint, question: &str) -> bool;
}

/// Return `true` when `response` affirms: its first non-blank character is
/// `y` or `Y`. Everything else, including empty input, declines.
///
/// ```
/// use caldb_mirror::prompt::is_affirmative;
///
/// assert!(is_affirmative("  Yes please"));
/// assert!(!is_affirmative(""));
/// assert!(!is_affirmative("n"));
/// ```
#[must_use]
pub fn is_affirmative(response: &str) -> bool {
    response
        .trim()
        .chars()
        .next()
        .is_some_and(|c| c.eq_ignore_ascii_case(&'y'))
}

/// A non-interactive decision applied to every checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedPolicy {
    /// Proceed at every checkpoint.
    AutoApprove,
    /// Decline at every checkpoint.
    AutoDeny,
}

impl Confirmer for FixedPolicy {
    fn confirm(&self, checkpoint: Checkpoint, question: &str) -> bool {
        let approved = matches!(self, Self::AutoApprove);
        info!("{checkpoint} checkpoint answered by policy ({approved}): {question}");
        approved
    }
}

/// Asks the operator on `output` and reads one line of `input`.
///
/// Read failures and end of input count as a decline.
pub struct InteractivePrompt<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl<R: BufRead, W: Write> InteractivePrompt<R, W> {
    /// Create a prompt over the given streams.
    #[must_use]
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }

    fn ask(&self, question: &str) -> std::io::Result<String> {
        {
            let mut output = self.output.borrow_mut();
            write!(output, "{question} (y/N)> ")?;
            output.flush()?;
        }
        let mut line = String::new();
        self.input.borrow_mut().read_line(&mut line)?;
        Ok(line)
    }
}

impl<R: BufRead, W: Write> Confirmer for InteractivePrompt<R, W> {
    fn confirm(&self, checkpoint: Checkpoint, question: &str) -> bool {
        match self.ask(question) {
            Ok(line) => is_affirmative(&line),
            Err(e) => {
                warn!("could not read {checkpoint} confirmation: {e}");
                false
            }
        }
    }
}
