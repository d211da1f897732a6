pub mod dijkstra;

pub use dijkstra::compute_routes;
