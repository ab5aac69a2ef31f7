//! Fixtures shared by the unit tests: hand-assembled streams and class files.

pub mod streams;
