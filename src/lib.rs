// lib.rs
pub mod alignment_filter;
pub mod alignment_record;
pub mod assembler;
pub mod coder;
pub mod commands;
pub mod consensus;
pub mod container;
pub mod error;
pub mod faidx;
pub mod features;
pub mod group_map;
pub mod labels;
pub mod pipeline;
pub mod position;
pub mod region;
pub mod sequence_index;
pub mod storage;
