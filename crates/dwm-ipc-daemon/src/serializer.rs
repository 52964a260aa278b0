//! Reply documents built from window-manager state

use serde::Serialize;

use crate::wm::{Client, ClientFlags, EnabledFlags, Monitor, Rect, TagState, WindowId, WmState};

#[derive(Debug, Serialize)]
pub struct MonitorDoc {
    pub master_factor: f32,
    pub num_master: u32,
    pub num: usize,
    pub is_selected: bool,
    pub monitor_geometry: Rect,
    pub window_geometry: Rect,
    pub tagset: CurrentOld<u32>,
    pub tag_state: TagState,
    pub clients: MonitorClientsDoc,
    pub layout: MonitorLayoutDoc,
    pub bar: BarDoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurrentOld<T> {
    pub current: T,
    pub old: T,
}

#[derive(Debug, Serialize)]
pub struct MonitorClientsDoc {
    pub selected: Option<WindowId>,
    /// Focus order, most recent first
    pub stack: Vec<WindowId>,
    /// Attach order
    pub all: Vec<WindowId>,
}

#[derive(Debug, Serialize)]
pub struct MonitorLayoutDoc {
    pub symbol: CurrentOld<String>,
    pub id: CurrentOld<usize>,
}

#[derive(Debug, Serialize)]
pub struct BarDoc {
    pub y: i32,
    pub is_shown: bool,
    pub is_top: bool,
    pub window_id: WindowId,
}

#[derive(Debug, Serialize)]
pub struct LayoutDoc<'a> {
    pub symbol: &'a str,
    pub id: usize,
}

#[derive(Debug, Serialize)]
pub struct ClientDoc<'a> {
    pub name: &'a str,
    pub pid: u32,
    pub tags: u32,
    pub window_id: WindowId,
    pub monitor_number: usize,
    pub geometry: CurrentOld<Rect>,
    pub size_hints: SizeHintsDoc,
    pub border_width: CurrentOld<i32>,
    pub states: StatesDoc,
}

#[derive(Debug, Serialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Serialize)]
pub struct AspectRatio {
    pub min: f32,
    pub max: f32,
}

#[derive(Debug, Serialize)]
pub struct SizeHintsDoc {
    pub base: Size,
    pub step: Size,
    pub max: Size,
    pub min: Size,
    pub aspect_ratio: AspectRatio,
}

/// Client state flags; flags not enabled in this build are left out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatesDoc {
    pub is_fixed: bool,
    pub is_floating: bool,
    pub is_urgent: bool,
    pub never_focus: bool,
    pub is_fullscreen: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_fake_fullscreen: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_sticky: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_hidden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_game: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_panel: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_always_on_top: Option<bool>,
}

pub fn states(flags: &ClientFlags, enabled: &EnabledFlags) -> StatesDoc {
    let gated = |on: bool, value: bool| on.then_some(value);
    StatesDoc {
        is_fixed: flags.fixed,
        is_floating: flags.floating,
        is_urgent: flags.urgent,
        never_focus: flags.never_focus,
        is_fullscreen: flags.fullscreen,
        is_fake_fullscreen: gated(enabled.fake_fullscreen, flags.fake_fullscreen),
        is_sticky: gated(enabled.sticky, flags.sticky),
        is_hidden: gated(enabled.hidden, flags.hidden),
        is_game: gated(enabled.game, flags.game),
        is_panel: gated(enabled.panel, flags.panel),
        is_always_on_top: gated(enabled.always_on_top, flags.always_on_top),
    }
}

pub fn monitor(wm: &WmState, monitor: &Monitor) -> MonitorDoc {
    let symbol_of = |id: usize| {
        wm.layouts
            .get(id)
            .map(|l| l.symbol.clone())
            .unwrap_or_default()
    };

    MonitorDoc {
        master_factor: monitor.mfact,
        num_master: monitor.nmaster,
        num: monitor.num,
        is_selected: monitor.num == wm.selected_monitor,
        monitor_geometry: monitor.screen,
        window_geometry: monitor.window_area,
        tagset: CurrentOld {
            current: monitor.tagset[monitor.seltags],
            old: monitor.tagset[monitor.seltags ^ 1],
        },
        tag_state: monitor.tag_state(),
        clients: MonitorClientsDoc {
            selected: monitor.selected,
            stack: monitor.stack.clone(),
            all: monitor.clients.iter().map(|c| c.window).collect(),
        },
        layout: MonitorLayoutDoc {
            symbol: CurrentOld {
                current: monitor.layout_symbol.clone(),
                old: symbol_of(monitor.previous_layout_id()),
            },
            id: CurrentOld {
                current: monitor.layout_id(),
                old: monitor.previous_layout_id(),
            },
        },
        bar: BarDoc {
            y: monitor.bar_y,
            is_shown: monitor.show_bar,
            is_top: monitor.top_bar,
            window_id: monitor.bar_window,
        },
    }
}

pub fn monitors(wm: &WmState) -> Vec<MonitorDoc> {
    wm.monitors.iter().map(|m| monitor(wm, m)).collect()
}

pub fn layouts(wm: &WmState) -> Vec<LayoutDoc<'_>> {
    wm.layouts
        .iter()
        .enumerate()
        .map(|(id, layout)| LayoutDoc {
            symbol: &layout.symbol,
            id,
        })
        .collect()
}

pub fn client<'a>(client: &'a Client, enabled: &EnabledFlags) -> ClientDoc<'a> {
    let hints = &client.hints;
    ClientDoc {
        name: &client.name,
        pid: client.pid,
        tags: client.tags,
        window_id: client.window,
        monitor_number: client.monitor,
        geometry: CurrentOld {
            current: client.geometry,
            old: client.old_geometry,
        },
        size_hints: SizeHintsDoc {
            base: Size {
                width: hints.base_width,
                height: hints.base_height,
            },
            step: Size {
                width: hints.inc_width,
                height: hints.inc_height,
            },
            max: Size {
                width: hints.max_width,
                height: hints.max_height,
            },
            min: Size {
                width: hints.min_width,
                height: hints.min_height,
            },
            aspect_ratio: AspectRatio {
                min: hints.min_aspect,
                max: hints.max_aspect,
            },
        },
        border_width: CurrentOld {
            current: client.border_width,
            old: client.old_border_width,
        },
        states: states(&client.flags, enabled),
    }
}
