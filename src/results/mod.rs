//! Scenario result flattening and top-N reporting

pub mod flatten;
pub mod report;

pub use flatten::{Cell, FlatRow, FlattenedResults, flatten};
pub use report::{Report, SortDirection, render_table, top_rows};
