//! Caption timing: segmentation, karaoke highlight schedules, and
//! subtitle export.

pub mod ass;
pub mod karaoke;
pub mod segment;
pub mod srt;
