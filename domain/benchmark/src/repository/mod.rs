mod dataset;

pub use dataset::DatasetRepo;
