// main.rs - Desktop front-end for the Gno-rendered Game of Life
// The window only draws snapshots and forwards button presses; every state
// change goes through the session controller running on the Tokio runtime.

use std::future::Future;

use anyhow::{Context, anyhow};
use conway::{
    Board, ConfigError, GnoRenderGateway, PRESETS, ServiceConfig, SessionConfig, SessionError,
    SessionHandle, SessionSnapshot, SessionState,
};
use eframe::egui;
use egui::{Align2, Color32, FontId, Rect, Stroke, Vec2};
use tokio::runtime::Runtime;
use tracing::{info, warn};

const MAX_DIMENSION: usize = 200;
const MAX_CELL_SIZE: f32 = 24.0;
const MIN_CELL_SIZE: f32 = 3.0;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let service = ServiceConfig::from_env().context("invalid service configuration")?;
    let gateway = GnoRenderGateway::new(&service).context("failed to build render gateway")?;
    info!(endpoint = %service.remote_rpc, realm = %service.realm_path, "using render service");

    let runtime = Runtime::new().context("failed to start tokio runtime")?;
    let session = {
        let _guard = runtime.enter();
        SessionHandle::spawn(SessionConfig::default(), gateway)
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([900.0, 900.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Game of Life on Gno",
        options,
        Box::new(move |cc| Box::new(GridApp::new(cc, runtime, session))),
    )
    .map_err(|err| anyhow!("window closed with an error: {err}"))
}

/// Settings as typed, before they are validated into a [`SessionConfig`].
#[derive(Debug, Clone, PartialEq)]
struct SettingsDraft {
    width: usize,
    height: usize,
    density: f64,
    alive_chars: String,
}

impl From<&SessionConfig> for SettingsDraft {
    fn from(config: &SessionConfig) -> Self {
        let dimensions = config.dimensions();
        Self {
            width: dimensions.width(),
            height: dimensions.height(),
            density: config.density(),
            alive_chars: config.alive_chars().iter().collect(),
        }
    }
}

impl SettingsDraft {
    fn to_config(&self, current: &SessionConfig) -> Result<SessionConfig, ConfigError> {
        current
            .to_builder()
            .dimensions(self.width, self.height)
            .density(self.density)
            .alive_chars(self.alive_chars.clone())
            .build()
    }
}

/// Draft plus the bookkeeping that keeps it in step with the live config.
struct SettingsPanel {
    draft: SettingsDraft,
    error: Option<String>,
    was_open: bool,
}

impl SettingsPanel {
    fn new(config: &SessionConfig) -> Self {
        Self {
            draft: SettingsDraft::from(config),
            error: None,
            was_open: false,
        }
    }

    /// Reloads the draft from `config` whenever the panel opens.
    fn follow(&mut self, open: bool, config: &SessionConfig) {
        if open && !self.was_open {
            self.draft = SettingsDraft::from(config);
            self.error = None;
        }
        self.was_open = open;
    }
}

struct GridApp {
    runtime: Runtime,
    session: SessionHandle,
    settings: SettingsPanel,
    live_color: Color32,
    dead_color: Color32,
}

impl GridApp {
    fn new(cc: &eframe::CreationContext<'_>, runtime: Runtime, session: SessionHandle) -> Self {
        let settings = SettingsPanel::new(&session.snapshot().config);
        let ctx = cc.egui_ctx.clone();
        let mut updates = session.subscribe();
        runtime.spawn(async move {
            while updates.changed().await.is_ok() {
                ctx.request_repaint();
            }
        });

        Self {
            runtime,
            session,
            settings,
            live_color: Color32::from_rgb(40, 200, 90),
            dead_color: Color32::from_gray(20),
        }
    }

    /// Runs a session command in the background. Render failures also land
    /// in the snapshot's error banner, so the log is enough here.
    fn send<F, Fut, T>(&self, label: &'static str, command: F)
    where
        F: FnOnce(SessionHandle) -> Fut,
        Fut: Future<Output = Result<T, SessionError>> + Send + 'static,
        T: Send + 'static,
    {
        let pending = command(self.session.clone());
        self.runtime.spawn(async move {
            if let Err(err) = pending.await {
                warn!(command = label, error = %err, "session command refused");
            }
        });
    }

    fn apply_draft(&mut self, current: &SessionConfig) {
        match self.settings.draft.to_config(current) {
            Ok(config) => {
                self.settings.error = None;
                self.send("update_config", move |session| async move {
                    session.update_config(config).await
                });
            }
            Err(err) => self.settings.error = Some(err.to_string()),
        }
    }

    fn controls(&mut self, ui: &mut egui::Ui, snapshot: &SessionSnapshot) {
        let running = snapshot.state == SessionState::Running;
        ui.horizontal(|ui| {
            let toggle = if running { "⏸ Pause" } else { "▶ Start" };
            if ui.button(toggle).clicked() {
                if running {
                    self.send("pause", |session| async move { session.pause().await });
                } else {
                    self.send("start", |session| async move { session.start().await });
                }
            }

            let can_step = !running && snapshot.state != SessionState::Stepping;
            if ui.add_enabled(can_step, egui::Button::new("⏭ Step")).clicked() {
                self.send("step", |session| async move { session.step().await });
            }

            if ui.button("⏹ Reset").clicked() {
                self.send("reset", |session| async move { session.reset().await });
            }

            let label = if snapshot.settings_open { "Hide settings" } else { "Settings" };
            if ui.button(label).clicked() {
                let open = !snapshot.settings_open;
                self.send("settings", move |session| async move {
                    session.set_settings_open(open).await
                });
            }

            ui.separator();
            ui.label(format!("State: {}", snapshot.state));
            ui.label(format!("Generation: {}", snapshot.generation));
        });
    }

    fn settings_panel(&mut self, ui: &mut egui::Ui, snapshot: &SessionSnapshot) {
        let mut changed = false;
        let draft = &mut self.settings.draft;
        ui.horizontal(|ui| {
            ui.label("Width:");
            changed |= ui
                .add(egui::DragValue::new(&mut draft.width).clamp_range(1..=MAX_DIMENSION))
                .changed();
            ui.label("Height:");
            changed |= ui
                .add(egui::DragValue::new(&mut draft.height).clamp_range(1..=MAX_DIMENSION))
                .changed();
            ui.separator();
            ui.label("Density:");
            changed |= ui
                .add(egui::Slider::new(&mut draft.density, 0.0..=1.0))
                .changed();
        });

        ui.horizontal(|ui| {
            ui.label("Cell characters:");
            changed |= ui
                .add(egui::TextEdit::singleline(&mut draft.alive_chars).desired_width(120.0))
                .changed();
            ui.separator();
            ui.label("Live:");
            ui.color_edit_button_srgba(&mut self.live_color);
            ui.label("Dead:");
            ui.color_edit_button_srgba(&mut self.dead_color);
        });

        if changed {
            self.apply_draft(&snapshot.config);
        }
        if let Some(err) = &self.settings.error {
            ui.colored_label(Color32::YELLOW, err);
        }

        ui.horizontal(|ui| {
            ui.label("Presets:");
            for preset in PRESETS {
                if ui.button(preset.name).clicked() {
                    let name = preset.name;
                    self.send("load_preset", move |session| async move {
                        session.load_preset(name).await
                    });
                }
            }
            ui.separator();
            if ui.button("🎲 Regenerate").clicked() {
                self.send("regenerate", |session| async move { session.regenerate().await });
            }
        });
    }

    fn paint_board(&self, ui: &mut egui::Ui, board: &Board) {
        let columns = board.width() as f32;
        let rows = board.height() as f32;
        let available = ui.available_size();
        let cell = (available.x / columns)
            .min(available.y / rows)
            .clamp(MIN_CELL_SIZE, MAX_CELL_SIZE);
        let spacing = if cell > 6.0 { 0.5 } else { 0.0 };
        let total = Vec2::new(columns * cell, rows * cell);

        let (response, painter) = ui.allocate_painter(total, egui::Sense::hover());
        let origin = response.rect.min;
        painter.rect_filled(response.rect, 0.0, Color32::BLACK);

        let font = FontId::monospace(cell * 0.8);
        for (y, row) in board.rows().enumerate() {
            for (x, state) in row.iter().enumerate() {
                let rect = Rect::from_min_size(
                    origin + Vec2::new(x as f32 * cell, y as f32 * cell),
                    Vec2::splat(cell - spacing),
                );
                painter.rect_filled(rect, 1.0, self.dead_color);
                if state.is_alive() {
                    if cell >= 10.0 {
                        painter.text(
                            rect.center(),
                            Align2::CENTER_CENTER,
                            state.to_char(),
                            font.clone(),
                            self.live_color,
                        );
                    } else {
                        painter.rect_filled(rect, 1.0, self.live_color);
                    }
                }
                if spacing > 0.0 {
                    painter.rect_stroke(rect, 1.0, Stroke::new(0.2, Color32::from_gray(60)));
                }
            }
        }
    }
}

impl eframe::App for GridApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let snapshot = self.session.snapshot();
        self.settings.follow(snapshot.settings_open, &snapshot.config);

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.heading("Conway's Game of Life, rendered on Gno");
            self.controls(ui, &snapshot);
            if snapshot.settings_open {
                ui.separator();
                self.settings_panel(ui, &snapshot);
            }
            if let Some(err) = &snapshot.last_error {
                ui.separator();
                ui.colored_label(Color32::from_rgb(230, 80, 80), err);
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| match &snapshot.board {
            Some(board) => {
                ui.label(format!("Live cells: {}", board.alive_count()));
                self.paint_board(ui, board);
            }
            None => {
                ui.centered_and_justified(|ui| {
                    ui.label("Press Start, Regenerate or pick a preset to seed a board.");
                });
            }
        });
    }
}
