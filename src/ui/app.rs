use std::time::{Duration, Instant};

use anyhow::Result;
use eframe::egui::{self, Color32, RichText, TopBottomPanel, Ui};
use tracing::warn;

use crate::api::SharedController;
use crate::controller::{WidgetController, WidgetSnapshot};

const REPAINT_INTERVAL: Duration = Duration::from_millis(500);
const STATUS_TTL: Duration = Duration::from_secs(3);

pub fn run_gui(controller: SharedController, api_url: Option<String>) -> Result<()> {
    let title = match controller.lock() {
        Ok(guard) => guard
            .config()
            .title
            .clone()
            .unwrap_or_else(|| "Delay Start".to_string()),
        Err(_) => "Delay Start".to_string(),
    };

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(title.clone())
            .with_inner_size([420.0, 380.0])
            .with_min_inner_size([340.0, 320.0]),
        ..Default::default()
    };

    let app = DelayStartApp::new(controller, title, api_url);

    eframe::run_native(
        "delaystart",
        native_options,
        Box::new(move |cc| {
            configure_theme(&cc.egui_ctx);
            Ok(Box::new(app))
        }),
    )
    .map_err(|err| anyhow::anyhow!("failed to launch delay-start widget: {err}"))?;

    Ok(())
}

fn configure_theme(ctx: &egui::Context) {
    let mut visuals = egui::Visuals::dark();
    let surface = Color32::from_rgb(18, 22, 28);
    visuals.panel_fill = surface;
    visuals.window_fill = surface;
    visuals.override_text_color = Some(Color32::from_rgb(232, 236, 240));
    for (widget, fill) in [
        (&mut visuals.widgets.inactive, Color32::from_rgb(30, 36, 46)),
        (&mut visuals.widgets.hovered, Color32::from_rgb(44, 54, 68)),
        (&mut visuals.widgets.active, Color32::from_rgb(58, 74, 94)),
    ] {
        widget.bg_fill = fill;
        widget.weak_bg_fill = fill;
    }
    visuals.selection.bg_fill = Color32::from_rgb(64, 160, 120);
    ctx.set_visuals(visuals);
}

/// A user gesture collected while drawing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UiAction {
    Hour(i32),
    Minute(i32),
    Toggle(bool),
    Program(usize),
}

/// Applies one gesture and returns a status line when there is something to report.
fn apply_action(controller: &mut WidgetController, action: UiAction) -> Option<String> {
    match action {
        UiAction::Hour(delta) => {
            controller.step_hour(delta);
            None
        }
        UiAction::Minute(delta) => {
            controller.step_minute(delta);
            None
        }
        UiAction::Toggle(enabled) => {
            let applied = controller.set_toggle(enabled);
            (enabled && !applied).then(|| "Best-price time not available yet.".to_string())
        }
        UiAction::Program(index) => match controller.select_program(index) {
            Ok(()) => None,
            Err(err) => Some(err.to_string()),
        },
    }
}

struct DelayStartApp {
    controller: SharedController,
    title: String,
    api_url: Option<String>,
    status_message: Option<(String, Instant)>,
}

impl DelayStartApp {
    fn new(controller: SharedController, title: String, api_url: Option<String>) -> Self {
        Self {
            controller,
            title,
            api_url,
            status_message: None,
        }
    }

    fn set_status(&mut self, text: impl Into<String>) {
        self.status_message = Some((text.into(), Instant::now() + STATUS_TTL));
    }

    fn snapshot(&self) -> Option<WidgetSnapshot> {
        match self.controller.lock() {
            Ok(guard) => Some(guard.snapshot()),
            Err(_) => None,
        }
    }

    fn dispatch(&mut self, actions: Vec<UiAction>) {
        if actions.is_empty() {
            return;
        }
        let messages: Vec<String> = match self.controller.lock() {
            Ok(mut guard) => actions
                .into_iter()
                .filter_map(|action| apply_action(&mut guard, action))
                .collect(),
            Err(_) => {
                warn!("widget state lock poisoned; dropping input");
                vec!["Internal state error.".to_string()]
            }
        };
        if let Some(last) = messages.into_iter().last() {
            self.set_status(last);
        }
    }

    fn show_header(&self, ui: &mut Ui, snapshot: &WidgetSnapshot) {
        ui.horizontal_wrapped(|ui| {
            ui.label(
                RichText::new(&self.title)
                    .size(22.0)
                    .color(Color32::from_rgb(96, 228, 206))
                    .strong(),
            );
            ui.separator();
            ui.label(
                RichText::new(format!("{} mode", snapshot.mode.as_str()))
                    .color(Color32::from_rgb(169, 188, 209)),
            );
        });
        if let Some((msg, _)) = &self.status_message {
            ui.label(
                RichText::new(msg)
                    .color(Color32::from_rgb(255, 183, 95))
                    .strong(),
            );
        }
    }

    fn show_time_picker(ui: &mut Ui, snapshot: &WidgetSnapshot, actions: &mut Vec<UiAction>) {
        ui.horizontal(|ui| {
            ui.vertical(|ui| {
                if ui.button("▲").clicked() {
                    actions.push(UiAction::Hour(1));
                }
                ui.label(RichText::new("hour").color(Color32::from_rgb(161, 180, 201)));
                if ui.button("▼").clicked() {
                    actions.push(UiAction::Hour(-1));
                }
            });
            ui.label(
                RichText::new(&snapshot.selected_time)
                    .size(44.0)
                    .color(Color32::from_rgb(255, 214, 117))
                    .strong(),
            );
            ui.vertical(|ui| {
                if ui.button("▲").clicked() {
                    actions.push(UiAction::Minute(1));
                }
                ui.label(RichText::new("min").color(Color32::from_rgb(161, 180, 201)));
                if ui.button("▼").clicked() {
                    actions.push(UiAction::Minute(-1));
                }
            });
        });
    }

    fn show_best_price(ui: &mut Ui, snapshot: &WidgetSnapshot, actions: &mut Vec<UiAction>) {
        if !snapshot.toggle_visible {
            return;
        }
        ui.horizontal(|ui| {
            let mut enabled = snapshot.use_best_price;
            let response = ui.add_enabled(
                snapshot.best_price_available,
                egui::Checkbox::new(&mut enabled, "Use best price"),
            );
            if response.changed() {
                actions.push(UiAction::Toggle(enabled));
            }
            match &snapshot.best_price_time {
                Some(best) => {
                    ui.label(
                        RichText::new(format!("cheapest at {best}"))
                            .color(Color32::from_rgb(108, 228, 138)),
                    );
                }
                None => {
                    ui.label(
                        RichText::new("not available")
                            .color(Color32::from_rgb(255, 183, 95)),
                    );
                }
            }
            if snapshot.use_best_price
                && let Some(manual) = &snapshot.manual_time
            {
                ui.label(
                    RichText::new(format!("(manual {manual})"))
                        .color(Color32::from_rgb(161, 180, 201)),
                );
            }
        });
    }

    fn show_programs(ui: &mut Ui, snapshot: &WidgetSnapshot, actions: &mut Vec<UiAction>) {
        if snapshot.programs.is_empty() {
            return;
        }
        let selected_text = snapshot.selected_program.clone().unwrap_or_default();
        egui::ComboBox::from_label("Program")
            .selected_text(selected_text)
            .show_ui(ui, |ui| {
                for (index, name) in snapshot.programs.iter().enumerate() {
                    let selected = index == snapshot.selected_program_index;
                    if ui.selectable_label(selected, name).clicked() && !selected {
                        actions.push(UiAction::Program(index));
                    }
                }
            });
    }

    fn show_delay(ui: &mut Ui, snapshot: &WidgetSnapshot) {
        let color = if snapshot.starts_now {
            Color32::from_rgb(108, 228, 138)
        } else {
            Color32::from_rgb(114, 220, 205)
        };
        ui.label(
            RichText::new(&snapshot.delay_text)
                .size(30.0)
                .color(color)
                .strong(),
        );
        ui.label(
            RichText::new(format!(
                "Set the device timer to {} min; it runs out at {}.",
                snapshot.delay_minutes, snapshot.timer_elapses_time
            ))
            .color(Color32::from_rgb(169, 188, 209)),
        );
    }
}

impl eframe::App for DelayStartApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some((_, expires_at)) = &self.status_message
            && Instant::now() >= *expires_at
        {
            self.status_message = None;
        }

        let Some(snapshot) = self.snapshot() else {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.label(
                    RichText::new("Widget state unavailable.")
                        .color(Color32::from_rgb(255, 120, 120))
                        .strong(),
                );
            });
            return;
        };

        let mut actions = Vec::new();

        TopBottomPanel::top("header")
            .resizable(false)
            .show(ctx, |ui| self.show_header(ui, &snapshot));

        if let Some(api_url) = &self.api_url {
            TopBottomPanel::bottom("footer")
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label(
                        RichText::new(format!("API {api_url}/v1 | state /v1/state"))
                            .color(Color32::from_rgb(120, 205, 192)),
                    );
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            Self::show_time_picker(ui, &snapshot, &mut actions);
            ui.add_space(6.0);
            Self::show_best_price(ui, &snapshot, &mut actions);
            Self::show_programs(ui, &snapshot, &mut actions);
            ui.separator();
            Self::show_delay(ui, &snapshot);
        });

        if !actions.is_empty() {
            self.dispatch(actions);
            ctx.request_repaint();
        } else {
            ctx.request_repaint_after(REPAINT_INTERVAL);
        }
    }
}
