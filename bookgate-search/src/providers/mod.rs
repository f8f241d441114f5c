//! Provider adapter implementations.
//!
//! Each module provides a struct implementing [`crate::provider::BookProvider`]
//! for one upstream metadata API.

pub mod google_books;
pub mod isbndb;
pub mod open_library;
pub mod scripted;

pub use google_books::GoogleBooksProvider;
pub use isbndb::IsbndbProvider;
pub use open_library::OpenLibraryProvider;
pub use scripted::ScriptedProvider;
