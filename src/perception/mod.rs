pub mod capture;
pub mod classes;
pub mod overlay;
pub mod pipeline;
pub mod traits;
pub mod types;
pub mod yolo_detector;
