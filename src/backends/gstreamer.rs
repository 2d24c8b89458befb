// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer capture graph: `source ! capsfilter ! sink`
//!
//! Bus messages are forwarded into the session's event loop from a bus sync
//! handler, so they are delivered on the worker thread rather than on a GLib
//! main context.

use super::{EventSender, PipelineBackend, PipelineController};
use crate::config::Config;
use crate::constants::{RotateMethod, WhiteBalanceMode, pipeline};
use crate::errors::{InitError, PipelineError};
use crate::session::state::{EventOrigin, PipelineEvent, PipelineState};
use crate::session::surface::RawSurface;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_video::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const BACKEND_NAME: &str = "gstreamer";

/// Photography interface property on the capture stage
const WHITE_BALANCE_PROPERTY: &str = "white-balance-mode";
const FOCUS_MODE_PROPERTY: &str = "focus-mode";
const ROTATE_PROPERTY: &str = "rotate-method";

pub(super) fn construct() -> Arc<dyn PipelineBackend> {
    Arc::new(GstBackend)
}

pub struct GstBackend;

impl PipelineBackend for GstBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn probe(&self, config: &Config) -> Result<(), InitError> {
        debug!("Initializing GStreamer");
        gst::init().map_err(|e| InitError::BackendUnavailable(e.to_string()))?;

        for factory in [
            config.source_element.as_str(),
            "capsfilter",
            config.sink_element.as_str(),
        ] {
            if gst::ElementFactory::find(factory).is_none() {
                return Err(InitError::BackendUnavailable(format!(
                    "element factory {} not found",
                    factory
                )));
            }
        }
        Ok(())
    }

    fn build(
        &self,
        config: &Config,
        events: EventSender,
    ) -> Result<Arc<dyn PipelineController>, InitError> {
        Ok(Arc::new(GstPipeline::new(config, events)?))
    }
}

/// Fields are dropped in reverse order of acquisition
pub struct GstPipeline {
    sink: gst::Element,
    filter: gst::Element,
    source: gst::Element,
    pipeline: gst::Pipeline,
}

impl GstPipeline {
    fn new(config: &Config, events: EventSender) -> Result<Self, InitError> {
        let construction = |e: gst::glib::BoolError| InitError::PipelineConstruction(e.to_string());

        info!(
            source = %config.source_element,
            sink = %config.sink_element,
            "Creating camera pipeline"
        );

        let source = gst::ElementFactory::make(&config.source_element)
            .name(pipeline::SOURCE_NAME)
            .build()
            .map_err(construction)?;
        let sink = gst::ElementFactory::make(&config.sink_element)
            .name(pipeline::SINK_NAME)
            .build()
            .map_err(construction)?;
        let filter = gst::ElementFactory::make("capsfilter")
            .name(pipeline::FILTER_NAME)
            .build()
            .map_err(construction)?;

        let pipeline = gst::Pipeline::with_name(pipeline::PIPELINE_NAME);
        pipeline
            .add_many([&source, &filter, &sink])
            .map_err(construction)?;
        gst::Element::link_many([&source, &filter, &sink]).map_err(construction)?;

        let bus = pipeline.bus().ok_or_else(|| {
            InitError::PipelineConstruction("pipeline has no bus".to_string())
        })?;
        bus.set_sync_handler(move |_bus, msg| {
            if let Some(event) = translate(msg)
                && events.send(event).is_err()
            {
                debug!("Event loop gone, dropping bus message");
            }
            gst::BusSyncReply::Drop
        });

        debug!("Pipeline ready");
        Ok(Self {
            sink,
            filter,
            source,
            pipeline,
        })
    }

    fn set_enum_property(
        element: &gst::Element,
        stage: &str,
        property: &str,
        nick: &str,
    ) -> Result<(), PipelineError> {
        if element.find_property(property).is_none() {
            return Err(PipelineError::new(
                stage,
                format!("property {} not supported", property),
            ));
        }
        element.set_property_from_str(property, nick);
        Ok(())
    }
}

impl PipelineController for GstPipeline {
    fn set_target_state(&self, state: PipelineState) -> Result<(), PipelineError> {
        debug!(state = %state, "Setting pipeline state");
        self.pipeline
            .set_state(to_gst_state(state))
            .map(|_| ())
            .map_err(|_| PipelineError::state_change_failed(pipeline::PIPELINE_NAME, state))
    }

    fn set_output_geometry(&self, width: u32, height: u32) -> Result<(), PipelineError> {
        let to_i32 = |v: u32| {
            i32::try_from(v).map_err(|_| {
                PipelineError::new(pipeline::FILTER_NAME, format!("dimension {} too large", v))
            })
        };
        let caps = gst::Caps::builder(pipeline::RAW_VIDEO_CAPS)
            .field("width", to_i32(width)?)
            .field("height", to_i32(height)?)
            .build();
        debug!(caps = %caps, "Applying output geometry");
        self.filter.set_property("caps", &caps);
        Ok(())
    }

    fn bind_surface(&self, surface: Option<RawSurface>) -> Result<(), PipelineError> {
        let overlay = self
            .sink
            .dynamic_cast_ref::<gstreamer_video::VideoOverlay>()
            .ok_or_else(|| {
                PipelineError::new(pipeline::SINK_NAME, "rendering stage has no overlay interface")
            })?;
        let handle = surface.map(|s| s.as_raw()).unwrap_or(0);
        // SAFETY: the session keeps the surface acquired until it has been
        // replaced here or unbound with a null handle.
        unsafe { overlay.set_window_handle(handle) };
        Ok(())
    }

    fn set_white_balance(&self, mode: WhiteBalanceMode) -> Result<(), PipelineError> {
        debug!(mode = %mode, "Setting white balance");
        Self::set_enum_property(
            &self.source,
            pipeline::SOURCE_NAME,
            WHITE_BALANCE_PROPERTY,
            photography_nick(mode),
        )
    }

    fn set_auto_focus(&self, enabled: bool) -> Result<(), PipelineError> {
        debug!(enabled, "Setting autofocus");
        let nick = if enabled { "auto" } else { "manual" };
        Self::set_enum_property(&self.source, pipeline::SOURCE_NAME, FOCUS_MODE_PROPERTY, nick)
    }

    fn set_rotation(&self, method: RotateMethod) -> Result<(), PipelineError> {
        Self::set_enum_property(&self.sink, pipeline::SINK_NAME, ROTATE_PROPERTY, method.nick())
    }
}

impl Drop for GstPipeline {
    fn drop(&mut self) {
        info!("Dropping camera pipeline");
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(error = ?e, "Failed to set pipeline to NULL");
        }
    }
}

/// Map a bus message to a session event; other messages are ignored
fn translate(msg: &gst::Message) -> Option<PipelineEvent> {
    use gst::MessageView;

    let source_name = || {
        msg.src()
            .map(|s| s.name().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    };

    match msg.view() {
        MessageView::StateChanged(changed) => {
            // only the top-level pipeline has no parent
            let origin = match msg.src() {
                Some(src) if src.parent().is_none() => EventOrigin::Pipeline,
                _ => EventOrigin::Stage(source_name()),
            };
            Some(PipelineEvent::StateChanged {
                origin,
                old: from_gst_state(changed.old())?,
                new: from_gst_state(changed.current())?,
                pending: from_gst_state(changed.pending()),
            })
        }
        MessageView::Error(err) => Some(PipelineEvent::Error {
            source: source_name(),
            message: err.error().to_string(),
        }),
        MessageView::Eos(_) => Some(PipelineEvent::EndOfStream),
        _ => None,
    }
}

fn to_gst_state(state: PipelineState) -> gst::State {
    match state {
        PipelineState::Null => gst::State::Null,
        PipelineState::Ready => gst::State::Ready,
        PipelineState::Paused => gst::State::Paused,
        PipelineState::Playing => gst::State::Playing,
    }
}

fn from_gst_state(state: gst::State) -> Option<PipelineState> {
    match state {
        gst::State::Null => Some(PipelineState::Null),
        gst::State::Ready => Some(PipelineState::Ready),
        gst::State::Paused => Some(PipelineState::Paused),
        gst::State::Playing => Some(PipelineState::Playing),
        _ => None,
    }
}

/// Nick of `GstPhotographyWhiteBalanceMode`, which shares the host index order
fn photography_nick(mode: WhiteBalanceMode) -> &'static str {
    match mode {
        WhiteBalanceMode::Auto => "auto",
        WhiteBalanceMode::Daylight => "daylight",
        WhiteBalanceMode::CloudyDaylight => "cloudy",
        WhiteBalanceMode::Twilight => "sunset",
        WhiteBalanceMode::Incandescent => "tungsten",
        WhiteBalanceMode::Fluorescent => "fluorescent",
        WhiteBalanceMode::Manual => "manual",
        WhiteBalanceMode::WarmFluorescent => "warm-fluorescent",
        WhiteBalanceMode::Shade => "shade",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping_round_trips() {
        for state in PipelineState::ALL {
            assert_eq!(from_gst_state(to_gst_state(state)), Some(state));
        }
        assert_eq!(from_gst_state(gst::State::VoidPending), None);
    }
}
