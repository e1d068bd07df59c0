//! The library code for the `folio` static blog generator. The architecture
//! can be generally broken down into two distinct steps:
//!
//! 1. Building a [`corpus::Corpus`] from source files on disk
//!    ([`crate::corpus`], with help from [`crate::frontmatter`] and
//!    [`crate::markdown`])
//! 2. Converting the corpus into output files on disk ([`crate::write`] and
//!    [`crate::feed`])
//!
//! Of the two, the second step is the more involved. It is itself composed of
//! three distinct sub-steps:
//!
//! 1. Building post pages
//! 2. Building index pages
//! 3. Rendering all pages and feeds to disk
//!
//! The second sub-step needs a group of index pages for each tag and another
//! group for the main index which contains every published post. A group of
//! index pages is referred to as an "index", and each index is
//! paginated--converted into groups of pages based on a configurable number of
//! posts per index page.
//!
//! Everything is written into a staging directory first. Only a build that
//! completes without errors replaces the previous output ([`crate::build`]).

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod corpus;
pub mod feed;
pub mod frontmatter;
pub mod highlight;
mod htmlrenderer;
pub mod markdown;
pub mod post;
pub mod tag;
pub mod template;
pub mod url;
mod util;
mod value;
pub mod write;
