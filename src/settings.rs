use image::Rgba;
use std::path::{Path, PathBuf};

use crate::components::tools::ToolSettings;
use crate::error::EngineResult;
use crate::ops::annotate::AnnotationStyle;

/// Persistent defaults, stored as a `key=value` file.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub brush_size: f32,
    pub brush_color: Rgba<u8>,
    pub shape_stroke_width: f32,
    pub annotation_stroke_width: f32,
    pub annotation_font_size: f32,
    pub annotation_padding: f32,
    /// Font file for annotation labels; empty means labels are drawn
    /// without text.
    pub label_font: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Default for Settings {
    fn default() -> Self {
        let tools = ToolSettings::default();
        let style = AnnotationStyle::default();
        Self {
            brush_size: tools.brush_size,
            brush_color: tools.color,
            shape_stroke_width: tools.stroke_width,
            annotation_stroke_width: style.stroke_width,
            annotation_font_size: style.font_size,
            annotation_padding: style.padding,
            label_font: String::new(),
            canvas_width: 1024,
            canvas_height: 1024,
        }
    }
}

impl Settings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/layerkit/layerkit_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\layerkit\layerkit_settings.cfg
    /// On macOS:   ~/Library/Application Support/layerkit/layerkit_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("layerkit_settings.cfg"))
    }

    /// Serialize a colour as "r,g,b,a"
    fn color_to_str(c: Rgba<u8>) -> String {
        format!("{},{},{},{}", c[0], c[1], c[2], c[3])
    }

    /// Parse a colour from "r,g,b,a"
    fn str_to_color(s: &str) -> Option<Rgba<u8>> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() == 4 {
            let r = parts[0].trim().parse::<u8>().ok()?;
            let g = parts[1].trim().parse::<u8>().ok()?;
            let b = parts[2].trim().parse::<u8>().ok()?;
            let a = parts[3].trim().parse::<u8>().ok()?;
            Some(Rgba([r, g, b, a]))
        } else {
            None
        }
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "brush_size={}\n\
             brush_color={}\n\
             shape_stroke_width={}\n\
             annotation_stroke_width={}\n\
             annotation_font_size={}\n\
             annotation_padding={}\n\
             label_font={}\n\
             canvas_width={}\n\
             canvas_height={}\n",
            self.brush_size,
            Self::color_to_str(self.brush_color),
            self.shape_stroke_width,
            self.annotation_stroke_width,
            self.annotation_font_size,
            self.annotation_padding,
            self.label_font,
            self.canvas_width,
            self.canvas_height,
        )
    }

    /// Parse settings text. Unknown keys are ignored; malformed values keep
    /// their defaults.
    pub fn from_config_str(content: &str) -> Self {
        let defaults = Self::default();
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "brush_size" => s.brush_size = val.parse().unwrap_or(defaults.brush_size),
                "brush_color" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.brush_color = c;
                    }
                }
                "shape_stroke_width" => {
                    s.shape_stroke_width = val.parse().unwrap_or(defaults.shape_stroke_width)
                }
                "annotation_stroke_width" => {
                    s.annotation_stroke_width = val.parse().unwrap_or(defaults.annotation_stroke_width)
                }
                "annotation_font_size" => {
                    s.annotation_font_size = val.parse().unwrap_or(defaults.annotation_font_size)
                }
                "annotation_padding" => {
                    s.annotation_padding = val.parse().unwrap_or(defaults.annotation_padding)
                }
                "label_font" => s.label_font = val.to_string(),
                "canvas_width" => s.canvas_width = val.parse().unwrap_or(defaults.canvas_width),
                "canvas_height" => s.canvas_height = val.parse().unwrap_or(defaults.canvas_height),
                _ => {}
            }
        }
        s
    }

    pub fn save_to(&self, path: &Path) -> EngineResult<()> {
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    /// Load settings (returns default if file missing or unreadable)
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }

    /// Load settings from the platform config location.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        Self::load_from(&path)
    }

    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            color: self.brush_color,
            brush_size: self.brush_size,
            stroke_width: self.shape_stroke_width,
        }
    }

    pub fn annotation_style(&self) -> AnnotationStyle {
        AnnotationStyle {
            stroke_width: self.annotation_stroke_width,
            font_size: self.annotation_font_size,
            padding: self.annotation_padding,
            ..AnnotationStyle::default()
        }
    }

    /// Configured label font path, if any.
    pub fn label_font_path(&self) -> Option<PathBuf> {
        if self.label_font.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.label_font))
        }
    }
}

/// Per-user application directory, shared by settings and the session log.
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let base = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                PathBuf::from(home).join(".config")
            });
        return Some(base.join("layerkit"));
    }
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")
            .or_else(|_| std::env::var("USERPROFILE"))
            .ok()?;
        return Some(PathBuf::from(appdata).join("layerkit"));
    }
    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
        return Some(
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("layerkit"),
        );
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.to_path_buf()))
    }
}
