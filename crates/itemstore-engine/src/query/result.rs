/// One page of query results
///
/// For update and delete statements `results` is empty and
/// `total_count` is the number of affected items.
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    pub results: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_count: u64,
}

impl<T> QueryResult<T> {
    pub fn affected(count: u64) -> Self {
        Self {
            results: Vec::new(),
            page: 0,
            page_size: 0,
            total_count: count,
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of pages at this page size; one when unpaginated
    pub fn page_count(&self) -> u64 {
        if self.page_size == 0 {
            return 1;
        }
        self.total_count.div_ceil(self.page_size as u64).max(1)
    }

    pub fn has_next_page(&self) -> bool {
        self.page_size > 0 && (self.page.max(1) as u64) < self.page_count()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> QueryResult<U> {
        QueryResult {
            results: self.results.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_count: self.total_count,
        }
    }
}

impl<T> IntoIterator for QueryResult<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
