//! Turning panel views into something a person can look at.

pub mod html;
pub mod text;
