use docket::common::{JsonObject, ScanConsistency};
use serde_json::{json, Value};

/// A query against a map-reduce view index.
///
/// Built fluently, then rendered to the parameter map the view service
/// expects. Key-range options are mutually additive; the derivation layer
/// is responsible for only setting combinations that make sense.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewQuery {
    design_document: String,
    view_name: String,
    key: Option<Value>,
    keys: Option<Vec<Value>>,
    start_key: Option<Value>,
    end_key: Option<Value>,
    inclusive_end: Option<bool>,
    descending: Option<bool>,
    skip: Option<u64>,
    limit: Option<u64>,
    reduce: Option<bool>,
    consistency: Option<ScanConsistency>,
    start_range: Option<Vec<Value>>,
    end_range: Option<Vec<Value>>,
}

impl ViewQuery {
    pub fn from(design_document: &str, view_name: &str) -> ViewQuery {
        ViewQuery {
            design_document: design_document.to_string(),
            view_name: view_name.to_string(),
            ..ViewQuery::default()
        }
    }

    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn keys(mut self, keys: Vec<Value>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn start_key(mut self, key: impl Into<Value>) -> Self {
        self.start_key = Some(key.into());
        self
    }

    pub fn end_key(mut self, key: impl Into<Value>) -> Self {
        self.end_key = Some(key.into());
        self
    }

    pub fn inclusive_end(mut self, inclusive: bool) -> Self {
        self.inclusive_end = Some(inclusive);
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = Some(descending);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn reduce(mut self, reduce: bool) -> Self {
        self.reduce = Some(reduce);
        self
    }

    pub fn consistency(mut self, consistency: ScanConsistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    /// Sets the parallel numeric start/end ranges used by dimensional
    /// (spatial) views.
    pub fn range(mut self, start_range: Vec<Value>, end_range: Vec<Value>) -> Self {
        self.start_range = Some(start_range);
        self.end_range = Some(end_range);
        self
    }

    pub fn design_document(&self) -> &str {
        &self.design_document
    }

    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    pub fn is_reduce(&self) -> bool {
        self.reduce.unwrap_or(false)
    }

    /// Renders the query options as the view service's parameter map.
    ///
    /// Consistency maps onto the legacy `stale` parameter: `RequestPlus`
    /// forces the index to catch up (`stale=false`), the default tolerates
    /// a stale index (`stale=ok`).
    pub fn params(&self) -> JsonObject {
        let mut params = JsonObject::new();
        if let Some(key) = &self.key {
            params.insert("key".to_string(), key.clone());
        }
        if let Some(keys) = &self.keys {
            params.insert("keys".to_string(), Value::Array(keys.clone()));
        }
        if let Some(start_key) = &self.start_key {
            params.insert("startkey".to_string(), start_key.clone());
        }
        if let Some(end_key) = &self.end_key {
            params.insert("endkey".to_string(), end_key.clone());
        }
        if let Some(inclusive_end) = self.inclusive_end {
            params.insert("inclusive_end".to_string(), json!(inclusive_end));
        }
        if let Some(descending) = self.descending {
            params.insert("descending".to_string(), json!(descending));
        }
        if let Some(skip) = self.skip {
            params.insert("skip".to_string(), json!(skip));
        }
        if let Some(limit) = self.limit {
            params.insert("limit".to_string(), json!(limit));
        }
        if let Some(reduce) = self.reduce {
            params.insert("reduce".to_string(), json!(reduce));
        }
        if let Some(consistency) = self.consistency {
            let stale = match consistency {
                ScanConsistency::NotBounded => "ok",
                ScanConsistency::RequestPlus => "false",
            };
            params.insert("stale".to_string(), json!(stale));
        }
        if let Some(start_range) = &self.start_range {
            params.insert("start_range".to_string(), Value::Array(start_range.clone()));
        }
        if let Some(end_range) = &self.end_range {
            params.insert("end_range".to_string(), Value::Array(end_range.clone()));
        }
        params
    }
}
