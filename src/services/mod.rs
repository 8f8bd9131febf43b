pub mod features;
pub mod model;
pub mod pipeline;
pub mod sectors;
pub mod transform;
pub mod weather;
