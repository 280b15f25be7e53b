//! Test doubles for the page environment.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::page::PageHost;

/// Host that records every call and answers confirmations with a fixed value.
pub struct RecordingHost {
  answer: bool,
  reloads: AtomicUsize,
  home_visits: AtomicUsize,
  prompts: Mutex<Vec<String>>,
  notices: Mutex<Vec<String>>,
}

impl RecordingHost {
  pub fn new(answer: bool) -> Self {
    Self {
      answer,
      reloads: AtomicUsize::new(0),
      home_visits: AtomicUsize::new(0),
      prompts: Mutex::new(Vec::new()),
      notices: Mutex::new(Vec::new()),
    }
  }

  pub fn reloads(&self) -> usize {
    self.reloads.load(Ordering::SeqCst)
  }

  pub fn home_visits(&self) -> usize {
    self.home_visits.load(Ordering::SeqCst)
  }

  pub fn prompts(&self) -> Vec<String> {
    self.prompts.lock().unwrap().clone()
  }

  pub fn notices(&self) -> Vec<String> {
    self.notices.lock().unwrap().clone()
  }
}

impl PageHost for RecordingHost {
  fn reload(&self) {
    self.reloads.fetch_add(1, Ordering::SeqCst);
  }

  fn navigate_home(&self) {
    self.home_visits.fetch_add(1, Ordering::SeqCst);
  }

  fn confirm(&self, prompt: &str) -> bool {
    self.prompts.lock().unwrap().push(prompt.to_string());
    self.answer
  }

  fn notify(&self, message: &str) {
    self.notices.lock().unwrap().push(message.to_string());
  }
}
