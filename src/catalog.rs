//! Topic catalog: maps free-form record topics onto a fixed set of main topics.
//!
//! Question banks tag items with fine-grained prerequisite names ("Surds",
//! "Mathematics: Sine Rule"). When a catalog is configured, every record topic
//! is canonicalised before analysis so that grouping, the prompt and coverage
//! checks all work on main-topic names. Without a catalog, topics are only
//! trimmed and stripped of a subject qualifier.

use serde::Deserialize;
use tracing::debug;

use crate::domain::QuizAnalysisInput;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CatalogTopic {
  pub name: String,
  #[serde(default)]
  pub prerequisites: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct TopicCatalog {
  topics: Vec<CatalogTopic>,
  // (lowercased prerequisite, index into `topics`)
  prerequisites: Vec<(String, usize)>,
}

impl TopicCatalog {
  pub fn new(topics: Vec<CatalogTopic>) -> Self {
    let prerequisites = topics
      .iter()
      .enumerate()
      .flat_map(|(i, t)| t.prerequisites.iter().map(move |p| (p.trim().to_lowercase(), i)))
      .filter(|(p, _)| !p.is_empty())
      .collect();
    Self { topics, prerequisites }
  }

  pub fn is_empty(&self) -> bool {
    self.topics.is_empty()
  }

  pub fn len(&self) -> usize {
    self.topics.len()
  }

  /// Main topic for `raw`, or `raw` unchanged when nothing matches.
  pub fn canonical<'a>(&'a self, raw: &'a str) -> &'a str {
    if self.is_empty() {
      return raw;
    }
    let cleaned = match raw.rsplit_once(':') {
      Some((_, rest)) => rest.trim(),
      None => raw.trim(),
    };
    if cleaned.is_empty() {
      return raw;
    }
    let lower = cleaned.to_lowercase();

    if let Some(t) = self.topics.iter().find(|t| t.name.to_lowercase() == lower) {
      return &t.name;
    }
    if let Some((_, i)) = self.prerequisites.iter().find(|(p, _)| *p == lower) {
      return &self.topics[*i].name;
    }
    if let Some((_, i)) = self
      .prerequisites
      .iter()
      .find(|(p, _)| lower.contains(p.as_str()) || p.contains(lower.as_str()))
    {
      return &self.topics[*i].name;
    }
    if let Some(t) = self.topics.iter().find(|t| {
      let name = t.name.to_lowercase();
      lower.contains(name.as_str()) || name.contains(lower.as_str())
    }) {
      return &t.name;
    }
    raw
  }

  /// Rewrite every record topic to its main topic. Padding and a subject
  /// qualifier are removed even without a catalog.
  pub fn canonicalize(&self, mut input: QuizAnalysisInput) -> QuizAnalysisInput {
    input.normalize_topics();
    if self.is_empty() {
      return input;
    }
    for r in &mut input.records {
      let mapped = self.canonical(&r.topic).to_string();
      if mapped != r.topic {
        debug!(target: "diagnostic", from = %r.topic, to = %mapped, "Topic canonicalised");
        r.topic = mapped;
      }
    }
    input
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::fixtures::*;

  fn catalog() -> TopicCatalog {
    TopicCatalog::new(vec![
      CatalogTopic {
        name: "Number and Numeration".into(),
        prerequisites: vec!["Fractions".into(), "Surds".into(), "Number Bases".into()],
      },
      CatalogTopic {
        name: "Geometry and Trigonometry".into(),
        prerequisites: vec!["Sine Rule".into(), "Circles".into()],
      },
      CatalogTopic { name: "Calculus".into(), prerequisites: vec!["Differentiation".into()] },
    ])
  }

  #[test]
  fn main_topic_matches_case_insensitively() {
    assert_eq!(catalog().canonical("calculus"), "Calculus");
  }

  #[test]
  fn prerequisite_and_subject_prefix() {
    let c = catalog();
    assert_eq!(c.canonical("Surds"), "Number and Numeration");
    assert_eq!(c.canonical("Mathematics: Sine Rule"), "Geometry and Trigonometry");
  }

  #[test]
  fn partial_matches_prefer_prerequisites() {
    let c = catalog();
    assert_eq!(c.canonical("Chords and Circles"), "Geometry and Trigonometry");
    assert_eq!(c.canonical("Geometry"), "Geometry and Trigonometry");
  }

  #[test]
  fn unmatched_topic_is_kept() {
    assert_eq!(catalog().canonical("Organic Chemistry"), "Organic Chemistry");
    assert_eq!(TopicCatalog::default().canonical("Surds"), "Surds");
  }

  #[test]
  fn empty_catalog_still_strips_padding_and_subject() {
    let quiz = input(vec![
      record("1", "Mathematics: Algebra", true, 4),
      record("2", "Algebra ", false, 2),
      record("3", " Physics: Optics", false, 2),
    ]);
    let out = TopicCatalog::default().canonicalize(quiz);
    assert_eq!(out.topics(), vec!["Algebra", "Physics: Optics"]);
  }

  #[test]
  fn canonicalize_rewrites_records() {
    let quiz = input(vec![record("1", "Surds", true, 4), record("2", "Fractions", false, 2)]);
    let out = catalog().canonicalize(quiz);
    assert_eq!(out.topics(), vec!["Number and Numeration"]);
  }
}
