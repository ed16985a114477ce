pub mod reader;
pub mod source;
pub mod text;
pub mod time;

pub use reader::{ArticleReader, NewsArticleReader, ReaderError, ReaderSettings};
pub use source::{NewsSearchPlan, NewsSource, NewsSourceRegistry};
