pub mod parser;
pub mod record;
pub mod timestamp;
pub mod watcher;

pub use parser::{parse_line, ParseError};
pub use record::Record;
pub use timestamp::LogFormat;
pub use watcher::{FileWatcher, WatchError, WatchOptions};
