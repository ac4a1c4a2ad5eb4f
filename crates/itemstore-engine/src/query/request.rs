use itemstore_model::Value;
use itemstore_storage::SortOrder;
use std::collections::{BTreeMap, HashMap};

/// What a query selects from
#[derive(Debug, Clone)]
pub enum QuerySource {
    /// A statement in the query language
    Statement(String),
    /// Items of a type whose properties equal every given value
    Filter {
        type_code: String,
        filter: BTreeMap<String, Value>,
    },
}

/// A query plus everything that shapes its execution
///
/// `page_size == 0` returns every match. Pages are numbered from one.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub source: QuerySource,
    pub named: HashMap<String, Value>,
    /// Values for `?1`, `?2`, ...
    pub positional: Vec<Value>,
    pub page: usize,
    pub page_size: usize,
    pub order_by: Vec<SortOrder>,
    pub read_only: bool,
    pub cachable: bool,
    pub ignore_cache: bool,
    pub eager_fetch_all: bool,
    pub eager_fetch: Vec<String>,
    pub clear_caches_after: bool,
}

impl QueryRequest {
    fn from_source(source: QuerySource) -> Self {
        Self {
            source,
            named: HashMap::new(),
            positional: Vec::new(),
            page: 0,
            page_size: 0,
            order_by: Vec::new(),
            read_only: false,
            cachable: false,
            ignore_cache: false,
            eager_fetch_all: false,
            eager_fetch: Vec::new(),
            clear_caches_after: false,
        }
    }

    pub fn statement(source: impl Into<String>) -> Self {
        Self::from_source(QuerySource::Statement(source.into()))
    }

    pub fn filter<I, K, V>(type_code: impl Into<String>, filter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::from_source(QuerySource::Filter {
            type_code: type_code.into(),
            filter: filter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        })
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Bind the next positional parameter
    pub fn positional(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn order_by(mut self, order: SortOrder) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn cachable(mut self) -> Self {
        self.cachable = true;
        self
    }

    pub fn ignore_cache(mut self) -> Self {
        self.ignore_cache = true;
        self
    }

    pub fn eager_all(mut self) -> Self {
        self.eager_fetch_all = true;
        self
    }

    pub fn eager(mut self, property: impl Into<String>) -> Self {
        self.eager_fetch.push(property.into());
        self
    }

    pub fn clear_caches_after(mut self) -> Self {
        self.clear_caches_after = true;
        self
    }

    pub(crate) fn wants_eager(&self) -> bool {
        self.eager_fetch_all || !self.eager_fetch.is_empty()
    }
}
