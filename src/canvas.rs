use log::warn;

use crate::animate::{Marker, Surface};

/// Handle to a line or label on a [`Canvas`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(usize);

/// Current data of a line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineState {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    /// Depth, for lines in 3-D axes
    pub zs: Option<Vec<f64>>,
    pub marker: Marker,
}

impl LineState {
    /// Number of points shown.
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Artist {
    Line(LineState),
    Label(String),
}

/// In-memory drawing surface that keeps the latest state of every line and label.
///
/// Useful for headless rendering and for checking what an animation
/// frame would show.
#[derive(Debug, Clone, Default)]
pub struct Canvas {
    artists: Vec<Artist>,
    calls: usize,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&self, handle: HandleId) -> Option<&LineState> {
        match self.artists.get(handle.0)? {
            Artist::Line(line) => Some(line),
            Artist::Label(_) => None,
        }
    }

    pub fn label(&self, handle: HandleId) -> Option<&str> {
        match self.artists.get(handle.0)? {
            Artist::Label(text) => Some(text),
            Artist::Line(_) => None,
        }
    }

    /// Number of lines and labels created so far.
    pub fn num_artists(&self) -> usize {
        self.artists.len()
    }

    /// Number of surface calls received, creation included.
    pub fn calls(&self) -> usize {
        self.calls
    }

    fn push(&mut self, artist: Artist) -> HandleId {
        self.calls += 1;
        self.artists.push(artist);
        HandleId(self.artists.len() - 1)
    }

    fn line_mut(&mut self, handle: HandleId) -> Option<&mut LineState> {
        self.calls += 1;
        match self.artists.get_mut(handle.0) {
            Some(Artist::Line(line)) => Some(line),
            _ => {
                warn!("Handle {} is not a line", handle.0);
                None
            }
        }
    }
}

impl Surface for Canvas {
    type Handle = HandleId;

    fn create_line(&mut self, xs: &[f64], ys: &[f64], zs: Option<&[f64]>) -> HandleId {
        self.push(Artist::Line(LineState {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            zs: zs.map(<[f64]>::to_vec),
            marker: Marker::None,
        }))
    }

    fn create_label(&mut self, text: &str) -> HandleId {
        self.push(Artist::Label(text.to_string()))
    }

    fn set_data(&mut self, handle: HandleId, xs: &[f64], ys: &[f64]) {
        if let Some(line) = self.line_mut(handle) {
            line.xs = xs.to_vec();
            line.ys = ys.to_vec();
        }
    }

    fn set_depth(&mut self, handle: HandleId, zs: &[f64]) {
        if let Some(line) = self.line_mut(handle) {
            line.zs = Some(zs.to_vec());
        }
    }

    fn set_marker(&mut self, handle: HandleId, marker: Marker) {
        if let Some(line) = self.line_mut(handle) {
            line.marker = marker;
        }
    }

    fn set_text(&mut self, handle: HandleId, text: &str) {
        self.calls += 1;
        match self.artists.get_mut(handle.0) {
            Some(Artist::Label(label)) => *label = text.to_string(),
            _ => warn!("Handle {} is not a label", handle.0),
        }
    }
}
