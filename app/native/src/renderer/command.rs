//! Renderer command builder.
//!
//! Turns one display binding plus the render settings of the current pass into
//! the exact `linux-wallpaperengine` invocation for that display. The output
//! is compared by equality to decide whether a running renderer must be
//! restarted, so the same inputs always produce byte-identical commands.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::types::non_blank;
use crate::config::{AppConfig, ScreenConfig};
use crate::utils::path::double_quote;

/// One display and the wallpaper bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayBinding {
    pub display: String,
    pub wallpaper: Option<String>,
}

impl DisplayBinding {
    #[must_use]
    pub fn new(display: impl Into<String>, wallpaper: Option<&str>) -> Self {
        Self {
            display: display.into(),
            wallpaper: wallpaper.map(str::to_string),
        }
    }
}

impl From<&ScreenConfig> for DisplayBinding {
    fn from(screen: &ScreenConfig) -> Self {
        Self {
            display: screen.name.clone(),
            wallpaper: non_blank(screen.wallpaper.as_ref()).map(str::to_string),
        }
    }
}

/// Render flags for one reconciliation pass, resolved from [`AppConfig`].
///
/// Blank strings in the config are normalized to `None` here so the builder
/// never emits a flag with an empty value.
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct RenderSettings {
    pub executable: String,
    pub fps: u32,
    pub silence: bool,
    pub volume: Option<u8>,
    pub no_automute: bool,
    pub no_audio_processing: bool,
    pub scaling: Option<String>,
    pub clamping: Option<String>,
    pub disable_mouse: bool,
    pub disable_parallax: bool,
    pub disable_particles: bool,
    pub no_fullscreen_pause: bool,
    pub fullscreen_pause_only_active: bool,
    pub fullscreen_pause_ignore_app_ids: Vec<String>,
    pub screenshot: Option<String>,
    pub screenshot_delay: Option<u32>,
    pub assets_dir: Option<String>,
    pub dump_structure: bool,
    pub playlists: Vec<String>,
    pub properties: BTreeMap<String, String>,
    pub wallpaper_properties: BTreeMap<String, BTreeMap<String, String>>,
    /// Already gated on `customArgsEnabled`.
    pub custom_args: Option<String>,
    pub clone_mode: bool,
    pub global_wallpaper: Option<String>,
}

fn owned(value: Option<&String>) -> Option<String> { non_blank(value).map(str::to_string) }

impl From<&AppConfig> for RenderSettings {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from(config: &AppConfig) -> Self {
        Self {
            executable: config.executable(),
            fps: config.effective_fps(),
            silence: config.silence,
            volume: config
                .volume
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.0, 100.0).round() as u8),
            no_automute: config.no_automute,
            no_audio_processing: config.no_audio_processing,
            scaling: owned(config.scaling.as_ref()),
            clamping: owned(config.clamping.as_ref()),
            disable_mouse: config.disable_mouse,
            disable_parallax: config.disable_parallax,
            disable_particles: config.disable_particles,
            no_fullscreen_pause: config.no_fullscreen_pause,
            fullscreen_pause_only_active: config.fullscreen_pause_only_active,
            fullscreen_pause_ignore_app_ids: config
                .fullscreen_pause_ignore_app_ids
                .iter()
                .filter_map(|id| owned(Some(id)))
                .collect(),
            screenshot: owned(config.screenshot.as_ref()),
            screenshot_delay: config.screenshot_delay.filter(|d| *d > 0),
            assets_dir: owned(config.assets_dir.as_ref()),
            dump_structure: config.dump_structure,
            playlists: config.playlist.entries(),
            properties: config.properties.clone(),
            wallpaper_properties: config.wallpaper_properties.clone(),
            custom_args: if config.custom_args_enabled {
                owned(config.custom_args.as_ref())
            } else {
                None
            },
            clone_mode: config.clone_mode,
            global_wallpaper: owned(config.global_wallpaper.as_ref()),
        }
    }
}

impl RenderSettings {
    /// Wallpaper a display should show after the clone-mode override.
    #[must_use]
    pub fn effective_wallpaper<'a>(&'a self, binding: &'a DisplayBinding) -> Option<&'a str> {
        let own = non_blank(binding.wallpaper.as_ref());
        if self.clone_mode {
            self.global_wallpaper.as_deref().or(own)
        } else {
            own
        }
    }

    /// The wallpaper's own property map when it has one, otherwise the
    /// global map. The two are never mixed.
    fn properties_for(&self, wallpaper: &str) -> BTreeMap<&str, &str> {
        self.wallpaper_properties
            .get(wallpaper)
            .unwrap_or(&self.properties)
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// A fully-formed renderer invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RendererCommand {
    pub executable: String,
    /// Shell words, already quoted where needed.
    pub args: Vec<String>,
}

impl RendererCommand {
    /// The command line handed to `sh -c`.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = shell_word(&self.executable);
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Whether this command renders the given wallpaper folder or id. The
    /// wallpaper is always the first argument.
    #[must_use]
    pub fn references(&self, wallpaper: &str) -> bool {
        !wallpaper.is_empty() && self.args.first().is_some_and(|arg| arg.contains(wallpaper))
    }
}

impl fmt::Display for RendererCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.command_line()) }
}

/// Quotes `value` only if it contains characters the shell would interpret.
fn shell_word(value: &str) -> String {
    let is_plain = |c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '+' | '@' | ',' | '%')
    };

    if !value.is_empty() && value.chars().all(is_plain) {
        value.to_string()
    } else {
        double_quote(value)
    }
}

/// Builds the renderer command for one display, or `None` when the display
/// has no effective wallpaper.
#[must_use]
pub fn build_command(binding: &DisplayBinding, settings: &RenderSettings) -> Option<RendererCommand> {
    let wallpaper = settings.effective_wallpaper(binding)?;

    let mut args = vec![shell_word(wallpaper), "-r".into(), shell_word(&binding.display)];
    args.extend(["-f".into(), settings.fps.to_string()]);

    if settings.silence {
        args.push("-s".into());
    } else if let Some(volume) = settings.volume {
        args.extend(["--volume".into(), volume.to_string()]);
    }

    push_flag(&mut args, settings.no_automute, "--noautomute");
    push_flag(&mut args, settings.no_audio_processing, "--no-audio-processing");

    if let Some(scaling) = &settings.scaling {
        args.extend(["--scaling".into(), shell_word(scaling)]);
    }
    if let Some(clamping) = &settings.clamping {
        args.extend(["--clamp".into(), shell_word(clamping)]);
    }

    push_flag(&mut args, settings.disable_mouse, "--disable-mouse");
    push_flag(&mut args, settings.disable_parallax, "--disable-parallax");
    push_flag(&mut args, settings.disable_particles, "--disable-particles");
    push_flag(&mut args, settings.no_fullscreen_pause, "--no-fullscreen-pause");
    push_flag(&mut args, settings.fullscreen_pause_only_active, "--fullscreen-pause-only-active");

    for app_id in &settings.fullscreen_pause_ignore_app_ids {
        args.extend(["--fullscreen-pause-ignore-appid".into(), shell_word(app_id)]);
    }

    if let Some(path) = &settings.screenshot {
        args.extend(["--screenshot".into(), double_quote(path)]);
    }
    if let Some(delay) = settings.screenshot_delay {
        args.extend(["--screenshot-delay".into(), delay.to_string()]);
    }
    if let Some(dir) = &settings.assets_dir {
        args.extend(["--assets-dir".into(), double_quote(dir)]);
    }

    push_flag(&mut args, settings.dump_structure, "--dump-structure");

    for playlist in &settings.playlists {
        args.extend(["--playlist".into(), double_quote(playlist)]);
    }

    for (key, value) in settings.properties_for(wallpaper) {
        args.extend(["--set-property".into(), format!("{key}={}", double_quote(value))]);
    }

    if let Some(custom) = &settings.custom_args {
        args.push(custom.clone());
    }

    Some(RendererCommand {
        executable: settings.executable.clone(),
        args,
    })
}

fn push_flag(args: &mut Vec<String>, enabled: bool, flag: &str) {
    if enabled {
        args.push(flag.to_string());
    }
}
