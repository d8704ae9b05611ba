use crate::schedule::ScheduleAggregator;
use crate::stops::{StopCatalog, StopSearch};

pub struct AppState {
    pub aggregator: ScheduleAggregator,
    pub catalog: StopCatalog,
    pub search: StopSearch,
}

impl AppState {
    pub fn new(aggregator: ScheduleAggregator, catalog: StopCatalog) -> Self {
        Self {
            aggregator,
            catalog,
            search: StopSearch::default(),
        }
    }
}
