/// Uniform load state for every store: computed once per store and
/// published on its watch channel, instead of ad-hoc loading/empty/error
/// booleans derived in the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    Loading,
    Empty,
    Error(String),
    Ready(T),
}

impl<T> LoadState<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(data) => Some(data),
            _ => None,
        }
    }
}

impl<T> LoadState<Vec<T>> {
    /// `Empty` for no rows, `Ready` otherwise.
    pub fn from_rows(rows: Vec<T>) -> Self {
        if rows.is_empty() {
            Self::Empty
        } else {
            Self::Ready(rows)
        }
    }

    /// The rows, if any. `Loading`, `Empty`, and `Error` are all row-less.
    pub fn rows(&self) -> &[T] {
        match self {
            Self::Ready(rows) => rows,
            _ => &[],
        }
    }
}
