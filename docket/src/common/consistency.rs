/// The staleness tolerance requested for a query against the store's
/// (possibly eventually-consistent) index.
///
/// A paged execution issues a data query and a count query; both must carry
/// the same consistency level so the reported total is not skewed by writes
/// interleaved between the two submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanConsistency {
    /// The query may run against a stale index (fastest, default).
    #[default]
    NotBounded,
    /// The index must catch up with all mutations issued before the query.
    RequestPlus,
}

impl ScanConsistency {
    /// The wire token the store facade expects.
    pub fn token(self) -> &'static str {
        match self {
            ScanConsistency::NotBounded => "not_bounded",
            ScanConsistency::RequestPlus => "request_plus",
        }
    }
}
