//! Sources of image strings for [`crate::mapper::Mapper::map_all`].
//!
//! Both sources are plain iterators yielding `io::Result<String>` and are
//! consumed once.

use std::io::{self, BufRead};

/// Images given as a list, e.g. command line arguments.
///
/// Empty strings are passed through and fail later as malformed references.
#[derive(Debug, Clone)]
pub struct ArgImages {
    inner: std::vec::IntoIter<String>,
}

impl ArgImages {
    pub fn new(args: Vec<String>) -> Self {
        ArgImages {
            inner: args.into_iter(),
        }
    }
}

impl Iterator for ArgImages {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(Ok)
    }
}

/// Images read one per line. Blank lines are skipped.
#[derive(Debug)]
pub struct ReaderImages<R> {
    lines: io::Lines<R>,
}

impl<R: BufRead> ReaderImages<R> {
    pub fn new(reader: R) -> Self {
        ReaderImages {
            lines: reader.lines(),
        }
    }
}

impl<R: BufRead> Iterator for ReaderImages<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) if line.is_empty() => continue,
                other => return Some(other),
            }
        }
    }
}
