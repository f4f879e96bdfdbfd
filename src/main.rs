use eframe::egui;
use gasmap_monitor::app::MonitorApp;
use tracing_subscriber::EnvFilter;

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .without_time()
        .init();

    let window_title = format!("GasMap Monitor v{}", env!("CARGO_PKG_VERSION"));

    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1100.0, 820.0])
        .with_resizable(true);

    let native_options = eframe::NativeOptions {
        viewport,
        vsync: true,
        multisampling: 0,
        ..Default::default()
    };

    eframe::run_native(
        &window_title,
        native_options,
        Box::new(|_cc| Ok(Box::new(MonitorApp::init()))),
    )
}
