//! Interactive input
//!
//! The pipeline asks for repair confirmations and change comments through
//! [`Prompter`] so the same code runs against a terminal or a script.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

/// Source of answers to pipeline questions
pub trait Prompter {
    /// Ask a question and return the answer, trimmed; empty when declined
    fn request_input(&mut self, prompt: &str) -> String;

    /// Yes/no question; anything but an answer starting with `y` is a no
    fn confirm(&mut self, prompt: &str) -> bool {
        let answer = self.request_input(&format!("{} [y/N]", prompt));
        answer.trim_start().starts_with(['y', 'Y'])
    }
}

/// Reads answers from standard input
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn request_input(&mut self, prompt: &str) -> String {
        print!("{} ", prompt);
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(_) => line.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read from stdin");
                String::new()
            }
        }
    }
}

/// Declines everything; used when no signer is present or input is not a terminal
#[derive(Debug, Default)]
pub struct DeclinePrompter;

impl Prompter for DeclinePrompter {
    fn request_input(&mut self, prompt: &str) -> String {
        tracing::debug!(prompt, "Declined prompt");
        String::new()
    }
}

/// Replays canned answers in order and records the questions asked
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<S: Into<String>>(answers: impl IntoIterator<Item = S>) -> Self {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Prompter for ScriptedPrompter {
    fn request_input(&mut self, prompt: &str) -> String {
        self.asked.push(prompt.to_string());
        self.answers.pop_front().map(|a| a.trim().to_string()).unwrap_or_default()
    }
}
