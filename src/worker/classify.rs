//! Request classification for the interceptor.

use url::{Origin, Url};

use super::types::ResourceRequest;

/// Directory markers that identify code bundles.
pub const DEFAULT_BUNDLE_MARKERS: &[&str] = &["/_next/static/chunks/", "/_next/static/", "/static/js/"];

/// File extensions that identify scripts.
pub const DEFAULT_SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs"];

/// How the interceptor treats a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Code bundle: network first, cached copy, then stand-in
  Bundle,
  /// Other same-origin asset: network, cached copy on total failure
  Asset,
  /// Not intercepted
  Passthrough,
}

#[derive(Debug, Clone)]
pub struct Classifier {
  origin: Origin,
  markers: Vec<String>,
  extensions: Vec<String>,
}

impl Classifier {
  pub fn new(serving_origin: &Url, markers: &[String], extensions: &[String]) -> Self {
    Self {
      origin: serving_origin.origin(),
      markers: markers.to_vec(),
      extensions: extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect(),
    }
  }

  /// Classifier with the default bundle markers and script extensions.
  pub fn with_defaults(serving_origin: &Url) -> Self {
    let markers: Vec<String> = DEFAULT_BUNDLE_MARKERS.iter().map(|s| s.to_string()).collect();
    let extensions: Vec<String> = DEFAULT_SCRIPT_EXTENSIONS
      .iter()
      .map(|s| s.to_string())
      .collect();
    Self::new(serving_origin, &markers, &extensions)
  }

  pub fn classify(&self, request: &ResourceRequest) -> RequestClass {
    if request.url.origin() != self.origin || request.method != "GET" {
      return RequestClass::Passthrough;
    }

    let path = request.url.path();
    if self.markers.iter().any(|m| path.contains(m.as_str())) || self.has_script_extension(path) {
      RequestClass::Bundle
    } else {
      RequestClass::Asset
    }
  }

  fn has_script_extension(&self, path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or_default();
    match file.rsplit_once('.') {
      Some((stem, ext)) if !stem.is_empty() => {
        let ext = ext.to_lowercase();
        self.extensions.iter().any(|e| *e == ext)
      }
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classifier() -> Classifier {
    Classifier::with_defaults(&Url::parse("https://app.test").unwrap())
  }

  fn get(url: &str) -> ResourceRequest {
    ResourceRequest::get(Url::parse(url).unwrap())
  }

  #[test]
  fn bundle_directory_marks_a_bundle() {
    let c = classifier();
    assert_eq!(c.classify(&get("https://app.test/_next/static/chunks/42.js")), RequestClass::Bundle);
    assert_eq!(c.classify(&get("https://app.test/_next/static/css/app.css")), RequestClass::Bundle);
  }

  #[test]
  fn script_extension_marks_a_bundle() {
    let c = classifier();
    assert_eq!(c.classify(&get("https://app.test/vendor/lib.MJS")), RequestClass::Bundle);
    assert_eq!(c.classify(&get("https://app.test/sw.js?v=3")), RequestClass::Bundle);
  }

  #[test]
  fn other_same_origin_requests_are_assets() {
    let c = classifier();
    assert_eq!(c.classify(&get("https://app.test/logo.png")), RequestClass::Asset);
    assert_eq!(c.classify(&get("https://app.test/")), RequestClass::Asset);
    assert_eq!(c.classify(&get("https://app.test/.js")), RequestClass::Asset);
    assert_eq!(c.classify(&get("https://app.test/json")), RequestClass::Asset);
  }

  #[test]
  fn cross_origin_requests_pass_through() {
    let c = classifier();
    assert_eq!(c.classify(&get("https://cdn.test/_next/static/chunks/1.js")), RequestClass::Passthrough);
    assert_eq!(c.classify(&get("http://app.test/a.js")), RequestClass::Passthrough);
  }

  #[test]
  fn non_get_requests_pass_through() {
    let c = classifier();
    let post = ResourceRequest::new("post", Url::parse("https://app.test/a.js").unwrap());
    assert_eq!(c.classify(&post), RequestClass::Passthrough);
  }
}
