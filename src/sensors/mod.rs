pub mod table;
pub mod ultrasonic;

pub use table::{ColumnRole, ColumnSpec, LoadedTable, TableLoader, TableSchema};
pub use ultrasonic::{ParseReport, UltrasonicLogParser};
