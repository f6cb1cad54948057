//! Argument completion from fixed value lists.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::provider::CompletionProvider;
use crate::types::{CompleteRequest, Completion, CompletionReference, HostError, HostResult};

/// Upper bound on the values returned by one completion.
pub const MAX_COMPLETION_VALUES: usize = 100;

/// Candidate values for one argument of one prompt or resource template.
///
/// `context` lists the other arguments (and their values) that must already
/// be resolved for these candidates to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEntry {
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    pub argument: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCompletionProvider {
    entries: Vec<CompletionEntry>,
}

impl InMemoryCompletionProvider {
    pub fn new(entries: Vec<CompletionEntry>) -> Self {
        Self { entries }
    }

    pub fn with_entry(
        mut self,
        reference: CompletionReference,
        argument: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.entries.push(CompletionEntry {
            reference,
            argument: argument.into(),
            context: BTreeMap::new(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CompletionProvider for InMemoryCompletionProvider {
    fn complete(&self, request: &CompleteRequest) -> HostResult<Completion> {
        let argument = &request.argument;
        let candidates: Vec<&CompletionEntry> = self
            .entries
            .iter()
            .filter(|e| e.reference == request.reference && e.argument == argument.name)
            .collect();
        if candidates.is_empty() {
            return Err(HostError::UnknownReference(format!(
                "{} argument '{}'",
                request.reference, argument.name
            )));
        }

        // Without a context every candidate applies.
        let context = request.context.as_ref().map(|c| &c.arguments);
        let applicable: Vec<&CompletionEntry> = candidates
            .iter()
            .copied()
            .filter(|e| context.map_or(true, |ctx| satisfied_by(e, ctx)))
            .collect();
        if applicable.is_empty() {
            let missing: BTreeSet<&str> = candidates
                .iter()
                .flat_map(|e| e.context.keys())
                .filter(|k| context.map_or(true, |ctx| !ctx.contains_key(*k)))
                .map(String::as_str)
                .collect();
            let detail = if missing.is_empty() {
                "no candidates for the given context".to_string()
            } else {
                missing.into_iter().collect::<Vec<_>>().join(", ")
            };
            return Err(HostError::MissingArgument(detail));
        }

        let mut seen = HashSet::new();
        let mut values: Vec<&str> = applicable
            .iter()
            .flat_map(|e| e.values.iter().map(String::as_str))
            .filter(|v| seen.insert(*v))
            .collect();
        values.sort_by_cached_key(|v| (prefix_distance(&argument.value, v), v.to_string()));

        let total = values.len();
        values.truncate(MAX_COMPLETION_VALUES);
        Ok(Completion {
            has_more: total > values.len(),
            values: values.into_iter().map(str::to_string).collect(),
            total,
        })
    }
}

fn satisfied_by(entry: &CompletionEntry, context: &BTreeMap<String, String>) -> bool {
    entry
        .context
        .iter()
        .all(|(key, value)| context.get(key) == Some(value))
}

/// Edit distance between the typed prefix and the same-length head of the
/// candidate, ignoring case.
fn prefix_distance(prefix: &str, candidate: &str) -> usize {
    let a: Vec<char> = prefix.to_lowercase().chars().collect();
    let b: Vec<char> = candidate.to_lowercase().chars().collect();
    let n = a.len().min(b.len());
    levenshtein(&a[..n], &b[..n])
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompletionArgument, CompletionContext};

    fn prompt_ref(name: &str) -> CompletionReference {
        CompletionReference::Prompt {
            name: name.to_string(),
        }
    }

    fn request(name: &str, argument: &str, value: &str) -> CompleteRequest {
        CompleteRequest {
            reference: prompt_ref(name),
            argument: CompletionArgument {
                name: argument.to_string(),
                value: value.to_string(),
            },
            context: None,
        }
    }

    #[test]
    fn test_closest_prefix_first() {
        let provider = InMemoryCompletionProvider::default().with_entry(
            prompt_ref("code_review"),
            "language",
            ["rust", "python", "ruby", "go"],
        );
        let completion = provider.complete(&request("code_review", "language", "ru")).unwrap();
        assert_eq!(completion.values, vec!["ruby", "rust", "go", "python"]);
        assert_eq!(completion.total, 4);
        assert!(!completion.has_more);
    }

    #[test]
    fn test_case_is_ignored() {
        let provider = InMemoryCompletionProvider::default().with_entry(
            prompt_ref("p"),
            "a",
            ["Zeta", "alpha"],
        );
        let completion = provider.complete(&request("p", "a", "ZE")).unwrap();
        assert_eq!(completion.values[0], "Zeta");
    }

    #[test]
    fn test_unknown_reference() {
        let provider =
            InMemoryCompletionProvider::default().with_entry(prompt_ref("p"), "a", ["x"]);
        let err = provider.complete(&request("other", "a", "")).unwrap_err();
        assert!(matches!(err, HostError::UnknownReference(_)));
        let err = provider.complete(&request("p", "b", "")).unwrap_err();
        assert!(matches!(err, HostError::UnknownReference(_)));
    }

    #[test]
    fn test_context_narrows_candidates() {
        let provider = InMemoryCompletionProvider::new(vec![
            CompletionEntry {
                reference: prompt_ref("deploy"),
                argument: "region".to_string(),
                context: BTreeMap::from([("cloud".to_string(), "aws".to_string())]),
                values: vec!["us-east-1".to_string(), "eu-west-1".to_string()],
            },
            CompletionEntry {
                reference: prompt_ref("deploy"),
                argument: "region".to_string(),
                context: BTreeMap::from([("cloud".to_string(), "gcp".to_string())]),
                values: vec!["europe-west1".to_string()],
            },
        ]);

        let mut req = request("deploy", "region", "");
        req.context = Some(CompletionContext {
            arguments: BTreeMap::from([("cloud".to_string(), "gcp".to_string())]),
        });
        let completion = provider.complete(&req).unwrap();
        assert_eq!(completion.values, vec!["europe-west1"]);

        req.context = Some(CompletionContext::default());
        let err = provider.complete(&req).unwrap_err();
        assert!(matches!(err, HostError::MissingArgument(ref a) if a.contains("cloud")));

        // No context at all: every candidate list applies.
        req.context = None;
        assert_eq!(provider.complete(&req).unwrap().total, 3);
    }

    #[test]
    fn test_duplicates_removed_and_truncated() {
        let values: Vec<String> = (0..150).map(|i| format!("v{i:03}")).collect();
        let provider = InMemoryCompletionProvider::default()
            .with_entry(prompt_ref("p"), "a", values.clone())
            .with_entry(prompt_ref("p"), "a", values);
        let completion = provider.complete(&request("p", "a", "")).unwrap();
        assert_eq!(completion.total, 150);
        assert_eq!(completion.values.len(), MAX_COMPLETION_VALUES);
        assert!(completion.has_more);
        assert_eq!(completion.values[0], "v000");
    }

    #[test]
    fn test_levenshtein() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(levenshtein(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
        assert_eq!(prefix_distance("", "anything"), 0);
    }
}
