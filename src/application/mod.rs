pub mod categories;
pub mod day_view;
pub mod session;

#[cfg(test)]
pub(crate) mod test_fixtures;
