pub mod answer_engine;
pub mod chart_renderer;
pub mod llm_service;
pub mod page_fetcher;
pub mod resource_classifier;
pub mod resource_loader;
pub mod submission_client;

pub use answer_engine::{TextEngine, TextQuestion, VisionEngine, VisionQuestion};
pub use chart_renderer::{BrowserChartRenderer, ChartRenderer};
pub use llm_service::LlmService;
pub use page_fetcher::{BrowserPageFetcher, PageFetcher};
pub use resource_classifier::{Classification, ResourceClassifier};
pub use resource_loader::{HttpResourceLoader, ImageData, LoadedResource, ResourceLoader};
pub use submission_client::{HttpSubmissionClient, SubmissionClient};
