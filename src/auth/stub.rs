use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::dns::{DnsError, LookupTxt};

/// In-memory TXT data keyed by normalized name. Unknown names answer empty.
#[derive(Default)]
pub(crate) struct StubResolver {
    answers: HashMap<String, Result<Vec<String>, DnsError>>,
    delays: HashMap<String, Duration>,
    queries: Mutex<Vec<String>>,
}

impl StubResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_records<I, S>(&mut self, name: &str, records: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = records.into_iter().map(Into::into).collect();
        self.answers.insert(normalize_name(name), Ok(values));
    }

    pub(crate) fn insert_error(&mut self, name: &str, error: DnsError) {
        self.answers.insert(normalize_name(name), Err(error));
    }

    pub(crate) fn insert_delay(&mut self, name: &str, delay: Duration) {
        self.delays.insert(normalize_name(name), delay);
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub(crate) fn query_count(&self, name: &str) -> usize {
        let key = normalize_name(name);
        self.queries().iter().filter(|q| **q == key).count()
    }
}

impl LookupTxt for StubResolver {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        let key = normalize_name(name);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(key.clone());
        }
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        self.answers.get(&key).cloned().unwrap_or(Ok(Vec::new()))
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}
