//! Lazy record streams returned by adapters.

use crate::error::OdmResult;
use omnidm_codec::Record;
use std::fmt;

/// A forward-only stream of decoded records.
///
/// Records are decoded as they are pulled. After the first error the
/// cursor yields nothing more; dropping it releases the native cursor.
pub struct RecordCursor {
    inner: Option<Box<dyn Iterator<Item = OdmResult<Record>> + Send>>,
}

impl RecordCursor {
    /// Wraps a native stream.
    pub fn new(inner: impl Iterator<Item = OdmResult<Record>> + Send + 'static) -> Self {
        Self {
            inner: Some(Box::new(inner)),
        }
    }

    /// A cursor that is already exhausted.
    pub fn empty() -> Self {
        Self { inner: None }
    }
}

impl Iterator for RecordCursor {
    type Item = OdmResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.as_mut()?.next();
        match item {
            Some(Ok(record)) => Some(Ok(record)),
            Some(Err(e)) => {
                self.inner = None;
                Some(Err(e))
            }
            None => {
                self.inner = None;
                None
            }
        }
    }
}

impl fmt::Debug for RecordCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCursor")
            .field("exhausted", &self.inner.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OdmError;

    #[test]
    fn stops_after_the_first_error() {
        let items = vec![
            Ok(Record::new().with("id", 1_i64)),
            Err(OdmError::value_conversion("age", "bad")),
            Ok(Record::new().with("id", 3_i64)),
        ];
        let mut cursor = RecordCursor::new(items.into_iter());
        assert!(cursor.next().unwrap().is_ok());
        assert!(cursor.next().unwrap().is_err());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn empty_is_exhausted() {
        assert_eq!(RecordCursor::empty().count(), 0);
    }
}
