pub mod admission;
pub mod detector;
pub mod executor;
pub mod reporter;
pub mod sim_trader;
pub mod tracker;
pub mod triangle_index;

#[cfg(test)]
pub mod test_support;
