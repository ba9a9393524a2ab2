mod condensation;
mod graph;
mod handlers;
mod models;
mod partitioned;
mod solve;
