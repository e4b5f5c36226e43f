mod bucket;
mod window;

pub use bucket::Bucket;
pub use bucket::MetricEvent;
pub use window::BucketArray;
pub use window::CurrentBucket;
pub use window::MetricWindow;
