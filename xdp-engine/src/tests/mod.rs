mod config;
mod mmap;
mod ring;
mod stats;
mod umem;
