// Application state for HTTP handlers
use crate::application::digitisation_service::DigitisationService;
use crate::application::plot_service::PlotService;

#[derive(Clone)]
pub struct AppState {
    pub digitisation_service: DigitisationService,
    pub plot_service: PlotService,
}
