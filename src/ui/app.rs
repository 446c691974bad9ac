use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};
use eframe::egui::{self, Align, Color32, Layout, RichText, Ui};
use tracing::warn;

use crate::api::ApiServer;
use crate::chime::clock::LAST_MINUTE_OF_HOUR;
use crate::chime::settings::ChimeSettings;
use crate::driver::{ClockInputs, SharedRuntime, spawn_clock};
use crate::error::ChimeError;
use crate::preferences::{ResolvedTheme, ThemePreference, TimeFormatter};
use crate::runtime::ChimeRuntime;
use crate::status::StatusSurface;
use crate::ticker::{TICK_PERIOD, TickerThread};
use crate::tone::player::{ChimeOutput, ChimeWorker, SilentOutput};

const APP_TITLE: &str = "Time Chime";

pub struct GuiOptions {
    pub settings: ChimeSettings,
    pub settings_path: PathBuf,
    pub inputs: ClockInputs,
    pub formatter: TimeFormatter,
    pub mute: bool,
    pub api: Option<ApiServer>,
}

pub fn run_gui(options: GuiOptions) -> Result<()> {
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(APP_TITLE)
            .with_inner_size([460.0, 560.0])
            .with_min_inner_size([360.0, 420.0]),
        ..Default::default()
    };

    eframe::run_native(
        APP_TITLE,
        native_options,
        Box::new(move |cc| {
            let app = TimeChimeApp::new(options, &cc.egui_ctx)?;
            Ok(Box::new(app))
        }),
    )
    .map_err(|err| anyhow!("failed to launch Time Chime GUI: {err}"))?;

    Ok(())
}

/// Mirrors the next chime into the window title.
pub struct TitleSurface {
    ctx: egui::Context,
}

impl StatusSurface for TitleSurface {
    fn set_next_chime(&mut self, next: Option<&str>) -> Result<()> {
        self.ctx
            .send_viewport_cmd(egui::ViewportCommand::Title(window_title(next)));
        Ok(())
    }
}

fn window_title(next: Option<&str>) -> String {
    match next {
        Some(time) => format!("{APP_TITLE} · next {time}"),
        None => APP_TITLE.to_string(),
    }
}

fn apply_theme(ctx: &egui::Context, theme: ResolvedTheme) {
    let visuals = match theme {
        ResolvedTheme::Dark => {
            let mut visuals = egui::Visuals::dark();
            visuals.panel_fill = Color32::from_rgb(14, 18, 26);
            visuals.selection.bg_fill = Color32::from_rgb(196, 150, 64);
            visuals
        }
        ResolvedTheme::Light => {
            let mut visuals = egui::Visuals::light();
            visuals.panel_fill = Color32::from_rgb(248, 246, 240);
            visuals.selection.bg_fill = Color32::from_rgb(222, 180, 96);
            visuals
        }
    };
    ctx.set_visuals(visuals);
}

fn accent(theme: ResolvedTheme) -> Color32 {
    match theme {
        ResolvedTheme::Dark => Color32::from_rgb(255, 214, 117),
        ResolvedTheme::Light => Color32::from_rgb(150, 98, 20),
    }
}

type GuiRuntime = ChimeRuntime<Box<dyn ChimeOutput + Send>, TitleSurface>;

/// The window only renders and edits the runtime. Chimes, signal polling and
/// API snapshots come from the clock thread, so they keep running while the
/// window is hidden or idle.
struct TimeChimeApp {
    runtime: SharedRuntime<Box<dyn ChimeOutput + Send>, TitleSurface>,
    applied_theme: Option<ResolvedTheme>,
    _clock: Option<TickerThread>,
}

impl TimeChimeApp {
    fn new(options: GuiOptions, ctx: &egui::Context) -> Result<Self, ChimeError> {
        let output: Box<dyn ChimeOutput + Send> = if options.mute {
            Box::new(SilentOutput)
        } else {
            Box::new(ChimeWorker::spawn())
        };
        let surface = TitleSurface { ctx: ctx.clone() };
        let now = options.inputs.time_source.source.now();
        let mut runtime =
            ChimeRuntime::new(options.settings, now, output, surface, options.formatter)?
                .with_settings_path(options.settings_path);
        options.inputs.drive(&mut runtime);
        let resolved = runtime.resolved_theme();
        apply_theme(ctx, resolved);

        let runtime = Arc::new(Mutex::new(runtime));
        let repaint_ctx = ctx.clone();
        let api = options.api;
        let clock = spawn_clock(
            Arc::clone(&runtime),
            options.inputs,
            TICK_PERIOD,
            move |runtime, _| {
                if let Some(api) = &api
                    && let Err(err) = api.publish(runtime.snapshot())
                {
                    warn!(%err, "API state not updated");
                }
                repaint_ctx.request_repaint();
            },
        );

        Ok(Self {
            runtime,
            applied_theme: Some(resolved),
            _clock: clock,
        })
    }

    fn sync_theme(&mut self, ctx: &egui::Context, theme: ResolvedTheme) {
        if self.applied_theme != Some(theme) {
            apply_theme(ctx, theme);
            self.applied_theme = Some(theme);
        }
    }
}

fn show_inactive(runtime: &mut GuiRuntime, ui: &mut Ui) {
    let theme = runtime.resolved_theme();
    ui.vertical_centered(|ui| {
        ui.add_space(12.0);
        ui.label(
            RichText::new(runtime.current_time_text())
                .size(28.0)
                .color(accent(theme)),
        );
        ui.add_space(16.0);
        ui.label(RichText::new("Chime every hour at").size(18.0));
    });

    let current_minute = runtime.clock().schedule().minute_of_hour();
    let mut selected = current_minute;
    ui.vertical_centered(|ui| {
        egui::ComboBox::from_id_salt("chime-minute")
            .selected_text(format!(":{selected:02}"))
            .height(320.0)
            .show_ui(ui, |ui| {
                for minute in 0..=LAST_MINUTE_OF_HOUR {
                    ui.selectable_value(&mut selected, minute, format!(":{minute:02}"));
                }
            });
    });
    if selected != current_minute
        && let Err(err) = runtime.set_minute(selected)
    {
        warn!(%err, "minute not applied");
    }

    ui.add_space(16.0);
    ui.separator();
    ui.label(RichText::new("Theme").strong());
    let mut preference = runtime.theme_preference();
    ui.horizontal(|ui| {
        ui.radio_value(&mut preference, ThemePreference::System, "System");
        ui.radio_value(&mut preference, ThemePreference::Light, "Light");
        ui.radio_value(&mut preference, ThemePreference::Dark, "Dark");
    });
    runtime.set_theme_preference(preference);

    ui.add_space(16.0);
    ui.separator();
    ui.horizontal(|ui| {
        if ui.button("Test chime").clicked() {
            runtime.test_chime();
        }
        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
            if ui
                .button(RichText::new("Enable").strong().size(16.0))
                .clicked()
            {
                runtime.set_active(true);
            }
        });
    });
}

fn show_active(runtime: &mut GuiRuntime, ui: &mut Ui) {
    let theme = runtime.resolved_theme();
    let minute = runtime.clock().schedule().minute_of_hour();
    ui.vertical_centered(|ui| {
        ui.add_space(20.0);
        ui.label(
            RichText::new(runtime.current_time_text())
                .size(48.0)
                .strong()
                .color(accent(theme)),
        );
        ui.add_space(6.0);
        ui.label(RichText::new(format!("Chimes at :{minute:02} every hour")).size(16.0));
        ui.add_space(18.0);
    });

    ui.label(RichText::new("Upcoming").strong());
    ui.horizontal_wrapped(|ui| {
        for chime in runtime.upcoming_chimes() {
            egui::Frame::group(ui.style()).show(ui, |ui| {
                ui.label(RichText::new(chime).monospace());
            });
        }
    });

    ui.add_space(18.0);
    ui.separator();
    ui.horizontal(|ui| {
        if ui.button("Test chime").clicked() {
            runtime.test_chime();
        }
        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
            if ui.button("Edit").clicked() {
                runtime.set_active(false);
            }
        });
    });
}

impl eframe::App for TimeChimeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let theme = {
            let mut runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
            egui::CentralPanel::default().show(ctx, |ui| {
                if runtime.clock().is_active() {
                    show_active(&mut runtime, ui);
                } else {
                    show_inactive(&mut runtime, ui);
                }
            });
            runtime.resolved_theme()
        };
        self.sync_theme(ctx, theme);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_shows_next_chime_or_app_name() {
        assert_eq!(window_title(Some("15:30")), "Time Chime · next 15:30");
        assert_eq!(window_title(Some("3:30 PM")), "Time Chime · next 3:30 PM");
        assert_eq!(window_title(None), "Time Chime");
    }

    #[test]
    fn accent_differs_per_theme() {
        assert_ne!(accent(ResolvedTheme::Dark), accent(ResolvedTheme::Light));
    }
}
