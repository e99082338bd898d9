pub mod descriptors;
