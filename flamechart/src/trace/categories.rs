// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Coarse activity categories used for coloring and range statistics.

use super::{EventKind, TraceEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventCategory {
    Loading,
    Experience,
    Scripting,
    Rendering,
    Painting,
    Gpu,
    Async,
    Other,
    Idle,
}

impl EventCategory {
    pub const ALL: [EventCategory; 9] = [
        EventCategory::Loading,
        EventCategory::Experience,
        EventCategory::Scripting,
        EventCategory::Rendering,
        EventCategory::Painting,
        EventCategory::Gpu,
        EventCategory::Async,
        EventCategory::Other,
        EventCategory::Idle,
    ];

    pub fn for_event(event: &TraceEvent) -> Self {
        match &event.kind {
            EventKind::ProfileCall(_) => EventCategory::Scripting,
            EventKind::GpuTask => EventCategory::Gpu,
            EventKind::NetworkRequest(_) | EventKind::ServerTiming(_) => EventCategory::Loading,
            EventKind::LayoutShift(_) | EventKind::LayoutShiftCluster(_) => {
                EventCategory::Experience
            }
            EventKind::Interaction(_) => EventCategory::Experience,
            _ => Self::for_name(&event.name),
        }
    }

    pub fn for_name(name: &str) -> Self {
        match name {
            "ParseHTML" | "ParseAuthorStyleSheet" | "ResourceSendRequest"
            | "ResourceReceiveResponse" | "ResourceFinish" | "ResourceReceivedData" => {
                EventCategory::Loading
            }
            "EvaluateScript" | "FunctionCall" | "EventDispatch" | "TimerFire"
            | "FireAnimationFrame" | "FireIdleCallback" | "v8.compile" | "v8.compileModule"
            | "V8.CompileCode" | "v8.evaluateModule" | "MajorGC" | "MinorGC"
            | "V8.GC_MC_BACKGROUND_EVACUATE_COPY" | "XHRReadyStateChange" | "XHRLoad"
            | "TimerInstall" | "TimerRemove" | "RequestAnimationFrame"
            | "CancelAnimationFrame" | "RequestIdleCallback" | "CancelIdleCallback"
            | "WebSocketCreate" | "WebSocketSend" | "WebSocketReceive" | "WebSocketDestroy"
            | "RunMicrotasks" | "ProfileCall" => EventCategory::Scripting,
            "Layout" | "UpdateLayoutTree" | "RecalculateStyles" | "InvalidateLayout"
            | "ScheduleStyleRecalculation" | "HitTest" | "PrePaint" | "Layerize"
            | "ScrollLayer" | "UpdateLayer" => EventCategory::Rendering,
            "Paint" | "PaintImage" | "RasterTask" | "CompositeLayers" | "Decode Image"
            | "Decode LazyPixelRef" | "ImageDecodeTask" | "Commit" | "UpdateLayerTree" => {
                EventCategory::Painting
            }
            "GPUTask" => EventCategory::Gpu,
            "LayoutShift" | "EventTiming" => EventCategory::Experience,
            "Idle" => EventCategory::Idle,
            _ => EventCategory::Other,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            EventCategory::Loading => "Loading",
            EventCategory::Experience => "Experience",
            EventCategory::Scripting => "Scripting",
            EventCategory::Rendering => "Rendering",
            EventCategory::Painting => "Painting",
            EventCategory::Gpu => "GPU",
            EventCategory::Async => "Async",
            EventCategory::Other => "System",
            EventCategory::Idle => "Idle",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            EventCategory::Loading => "#0867cb",
            EventCategory::Experience => "#d33c3c",
            EventCategory::Scripting => "#e6b017",
            EventCategory::Rendering => "#9a7ee6",
            EventCategory::Painting => "#2d9a48",
            EventCategory::Gpu => "#0e7c19",
            EventCategory::Async => "#c3a2f2",
            EventCategory::Other => "#dadce0",
            EventCategory::Idle => "#ffffff",
        }
    }
}

/// Human readable names for well known trace events.
pub fn readable_name(name: &str) -> Option<&'static str> {
    Some(match name {
        "RunTask" => "Task",
        "ParseHTML" => "Parse HTML",
        "ParseAuthorStyleSheet" => "Parse stylesheet",
        "EvaluateScript" => "Evaluate script",
        "v8.compile" | "V8.CompileCode" => "Compile code",
        "v8.compileModule" => "Compile module",
        "v8.evaluateModule" => "Evaluate module",
        "FunctionCall" => "Function call",
        "EventDispatch" => "Event",
        "TimerInstall" => "Install timer",
        "TimerRemove" => "Remove timer",
        "TimerFire" => "Timer fired",
        "RequestAnimationFrame" => "Request animation frame",
        "CancelAnimationFrame" => "Cancel animation frame",
        "FireAnimationFrame" => "Animation frame fired",
        "RequestIdleCallback" => "Request idle callback",
        "CancelIdleCallback" => "Cancel idle callback",
        "FireIdleCallback" => "Fire idle callback",
        "WebSocketCreate" => "Create WebSocket",
        "WebSocketSend" => "Send WebSocket message",
        "WebSocketReceive" => "Receive WebSocket message",
        "WebSocketDestroy" => "Destroy WebSocket",
        "XHRReadyStateChange" => "XHR ready state change",
        "XHRLoad" => "XHR load",
        "MajorGC" => "Major GC",
        "MinorGC" => "Minor GC",
        "RunMicrotasks" => "Run microtasks",
        "Layout" => "Layout",
        "UpdateLayoutTree" | "RecalculateStyles" => "Recalculate style",
        "InvalidateLayout" => "Invalidate layout",
        "ScheduleStyleRecalculation" => "Schedule style recalculation",
        "HitTest" => "Hit test",
        "PrePaint" => "Pre-paint",
        "Layerize" => "Layerize",
        "Paint" => "Paint",
        "PaintImage" => "Paint image",
        "RasterTask" => "Rasterize paint",
        "CompositeLayers" => "Composite layers",
        "Commit" => "Commit",
        "ImageDecodeTask" | "Decode Image" => "Image decode",
        "GPUTask" => "GPU",
        "LayoutShift" => "Layout shift",
        "EventTiming" => "Interaction",
        _ => return None,
    })
}
