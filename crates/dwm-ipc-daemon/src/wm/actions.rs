//! Window-manager actions exposed as IPC commands

use tracing::debug;

use super::state::WmState;
use crate::command::{Arg, ArgType, CommandRegistry};

/// Smallest and largest accepted master area factor
const MFACT_MIN: f32 = 0.05;
const MFACT_MAX: f32 = 0.95;

fn uint(args: &[Arg]) -> u32 {
    args.first().and_then(Arg::as_u64).unwrap_or(0) as u32
}

fn sint(args: &[Arg]) -> i64 {
    args.first().and_then(Arg::as_i64).unwrap_or(0)
}

/// Register the standard command table
pub fn register_defaults(registry: &mut CommandRegistry) {
    let table: [(&str, ArgType, fn(&mut WmState, &[Arg])); 15] = [
        ("view", ArgType::UnsignedInt, |wm, a| view(wm, uint(a))),
        ("toggleview", ArgType::UnsignedInt, |wm, a| toggle_view(wm, uint(a))),
        ("tag", ArgType::UnsignedInt, |wm, a| tag(wm, uint(a))),
        ("toggletag", ArgType::UnsignedInt, |wm, a| toggle_tag(wm, uint(a))),
        ("tagmon", ArgType::SignedInt, |wm, a| tag_monitor(wm, sint(a))),
        ("focusmon", ArgType::SignedInt, |wm, a| focus_monitor(wm, sint(a))),
        ("focusstack", ArgType::SignedInt, |wm, a| focus_stack(wm, sint(a))),
        ("zoom", ArgType::None, |wm, _| zoom(wm)),
        ("incnmaster", ArgType::SignedInt, |wm, a| inc_nmaster(wm, sint(a))),
        ("killclient", ArgType::None, |wm, _| kill_client(wm)),
        ("togglefloating", ArgType::None, |wm, _| toggle_floating(wm)),
        ("togglefullscreen", ArgType::None, |wm, _| toggle_fullscreen(wm)),
        ("setmfact", ArgType::Float, |wm, a| {
            if let Some(f) = a.first().and_then(Arg::as_f64) {
                set_mfact(wm, f as f32)
            }
        }),
        ("setlayoutsafe", ArgType::Handle, |wm, a| {
            set_layout_safe(wm, a.first().and_then(Arg::as_handle))
        }),
        ("quit", ArgType::None, |wm, _| wm.running = false),
    ];

    for (name, arg_type, action) in table {
        if let Err(e) = registry.register(name, &[arg_type], action) {
            tracing::warn!("Skipping command: {}", e);
        }
    }
}

/// Show exactly the given tags; zero swaps back to the previous tagset
pub fn view(wm: &mut WmState, tags: u32) {
    let tags = tags & wm.tag_mask();
    let monitor = wm.selmon_mut();
    if tags == monitor.selected_tags() {
        return;
    }
    monitor.seltags ^= 1;
    if tags != 0 {
        monitor.tagset[monitor.seltags] = tags;
    }
    refocus_and_arrange(wm);
}

pub fn toggle_view(wm: &mut WmState, tags: u32) {
    let tags = tags & wm.tag_mask();
    let monitor = wm.selmon_mut();
    let new_tagset = monitor.selected_tags() ^ tags;
    if new_tagset != 0 {
        let seltags = monitor.seltags;
        monitor.tagset[seltags] = new_tagset;
        refocus_and_arrange(wm);
    }
}

/// Move the focused client to the given tags
pub fn tag(wm: &mut WmState, tags: u32) {
    let tags = tags & wm.tag_mask();
    let Some(window) = wm.selmon().selected else {
        return;
    };
    if tags == 0 {
        return;
    }
    if let Some(client) = wm.client_mut(window) {
        client.tags = tags;
    }
    refocus_and_arrange(wm);
}

pub fn toggle_tag(wm: &mut WmState, tags: u32) {
    let tags = tags & wm.tag_mask();
    let Some(window) = wm.selmon().selected else {
        return;
    };
    let Some(client) = wm.client_mut(window) else {
        return;
    };
    let new_tags = client.tags ^ tags;
    if new_tags != 0 {
        client.tags = new_tags;
        refocus_and_arrange(wm);
    }
}

/// Send the focused client to the next (`dir > 0`) or previous monitor
pub fn tag_monitor(wm: &mut WmState, dir: i64) {
    if wm.monitors.len() < 2 {
        return;
    }
    let Some(window) = wm.selmon().selected else {
        return;
    };
    let target = wm.monitor_in_direction(dir);
    wm.send_to_monitor(window, target);
}

/// Focus the next (`dir > 0`) or previous monitor
pub fn focus_monitor(wm: &mut WmState, dir: i64) {
    if wm.monitors.len() < 2 {
        return;
    }
    let target = wm.monitor_in_direction(dir);
    if target == wm.selected_monitor {
        return;
    }
    debug!("Focusing monitor {}", target);
    wm.selected_monitor = target;
    wm.focus(None);
}

/// Cycle focus through the visible clients of the focused monitor
pub fn focus_stack(wm: &mut WmState, dir: i64) {
    let monitor = wm.selmon();
    let Some(selected) = monitor.selected else {
        return;
    };
    let visible: Vec<_> = monitor
        .clients
        .iter()
        .filter(|c| monitor.is_visible(c))
        .map(|c| c.window)
        .collect();
    let Some(index) = visible.iter().position(|&w| w == selected) else {
        return;
    };

    let next = if dir > 0 {
        (index + 1) % visible.len()
    } else {
        (index + visible.len() - 1) % visible.len()
    };
    wm.focus(Some(visible[next]));
}

/// Swap the focused client with the master, or promote the next tiled one
/// if it already is the master
pub fn zoom(wm: &mut WmState) {
    let monitor = wm.selmon();
    if !monitor.is_arranged() {
        return;
    }
    let Some(selected) = monitor.selected_client() else {
        return;
    };
    if selected.flags.floating {
        return;
    }

    let mut tiled = monitor
        .clients
        .iter()
        .filter(|c| monitor.is_visible(c) && !c.flags.floating)
        .map(|c| c.window);
    let window = match tiled.next() {
        Some(master) if master == selected.window => match tiled.next() {
            Some(next) => next,
            None => return,
        },
        _ => selected.window,
    };

    let monitor_num = wm.selected_monitor;
    let monitor = wm.selmon_mut();
    if let Some(client) = monitor.detach(window) {
        monitor.attach(client);
    }
    wm.focus(Some(window));
    wm.arrange(monitor_num);
}

pub fn inc_nmaster(wm: &mut WmState, delta: i64) {
    let monitor = wm.selmon_mut();
    monitor.nmaster = (monitor.nmaster as i64)
        .saturating_add(delta)
        .clamp(0, u32::MAX as i64) as u32;
    let num = wm.selected_monitor;
    wm.arrange(num);
}

/// Close the focused client
pub fn kill_client(wm: &mut WmState) {
    if let Some(window) = wm.selmon().selected {
        debug!("Killing client {}", window);
        wm.unmanage(window);
    }
}

pub fn toggle_floating(wm: &mut WmState) {
    let Some(window) = wm.selmon().selected else {
        return;
    };
    let Some(client) = wm.client_mut(window) else {
        return;
    };
    // Fullscreen clients cannot be toggled
    if client.flags.fullscreen {
        return;
    }
    client.flags.floating = !client.flags.floating || client.flags.fixed;
    let num = wm.selected_monitor;
    wm.arrange(num);
}

pub fn toggle_fullscreen(wm: &mut WmState) {
    if let Some(client) = wm.focused_client() {
        let (window, fullscreen) = (client.window, client.flags.fullscreen);
        wm.set_fullscreen(window, !fullscreen);
    }
}

/// Values below 1.0 adjust the factor relatively; values of 1.0 and above
/// set it to `f - 1.0`. Results outside `[0.05, 0.95]` are ignored.
pub fn set_mfact(wm: &mut WmState, f: f32) {
    let monitor = wm.selmon_mut();
    if !monitor.is_arranged() {
        return;
    }
    let f = if f < 1.0 { f + monitor.mfact } else { f - 1.0 };
    if !(MFACT_MIN..=MFACT_MAX).contains(&f) {
        return;
    }
    monitor.mfact = f;
    let num = wm.selected_monitor;
    wm.arrange(num);
}

/// Switch to a layout by id, or toggle back to the previous layout when no
/// id is given. Unknown ids are ignored.
pub fn set_layout_safe(wm: &mut WmState, layout: Option<usize>) {
    if layout.is_some_and(|id| id >= wm.layouts.len()) {
        debug!("Ignoring unknown layout id {:?}", layout);
        return;
    }

    let monitor = wm.selmon_mut();
    if layout != Some(monitor.layout_id()) {
        monitor.sellt ^= 1;
    }
    if let Some(id) = layout {
        let sellt = monitor.sellt;
        monitor.layouts[sellt] = id;
    }
    let num = wm.selected_monitor;
    wm.arrange(num);
}

fn refocus_and_arrange(wm: &mut WmState) {
    wm.focus(None);
    let num = wm.selected_monitor;
    wm.arrange(num);
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwm_ipc_config::{ClientConfig, Config, MonitorConfig};

    fn wm_with_clients(names: &[&str]) -> WmState {
        let mut wm = WmState::from_config(&Config::default());
        for name in names {
            wm.manage(&ClientConfig::new(*name));
        }
        wm
    }

    fn dual_monitor() -> WmState {
        let mut config = Config::default();
        config.monitors.push(MonitorConfig {
            x: 1920,
            ..MonitorConfig::default()
        });
        WmState::from_config(&config)
    }

    #[test]
    fn test_default_registry_has_standard_commands() {
        let registry = CommandRegistry::with_defaults();
        assert_eq!(registry.len(), 15);
        assert_eq!(registry.get("view").unwrap().arg_types, vec![ArgType::UnsignedInt]);
        assert_eq!(registry.get("setlayoutsafe").unwrap().arg_types, vec![ArgType::Handle]);
        assert_eq!(registry.get("zoom").unwrap().arg_types, vec![ArgType::None]);
    }

    #[test]
    fn test_view_switches_and_swaps_back() {
        let mut wm = wm_with_clients(&[]);
        view(&mut wm, 4);
        assert_eq!(wm.selmon().selected_tags(), 4);

        // Viewing the current tags is a no-op
        view(&mut wm, 4);
        assert_eq!(wm.selmon().selected_tags(), 4);

        view(&mut wm, 0);
        assert_eq!(wm.selmon().selected_tags(), 1);
    }

    #[test]
    fn test_view_masks_unknown_tags() {
        let mut wm = wm_with_clients(&[]);
        view(&mut wm, 0x200 | 2);
        assert_eq!(wm.selmon().selected_tags(), 2);
    }

    #[test]
    fn test_toggle_view_never_empties_tagset() {
        let mut wm = wm_with_clients(&[]);
        toggle_view(&mut wm, 2);
        assert_eq!(wm.selmon().selected_tags(), 3);
        toggle_view(&mut wm, 3);
        assert_eq!(wm.selmon().selected_tags(), 3);
    }

    #[test]
    fn test_tag_moves_focused_client_out_of_view() {
        let mut wm = wm_with_clients(&["a"]);
        tag(&mut wm, 2);
        let client = &wm.selmon().clients[0];
        assert_eq!(client.tags, 2);
        assert_eq!(wm.selmon().selected, None);
    }

    #[test]
    fn test_toggle_tag_keeps_at_least_one_tag() {
        let mut wm = wm_with_clients(&["a"]);
        toggle_tag(&mut wm, 4);
        assert_eq!(wm.focused_client().unwrap().tags, 5);
        toggle_tag(&mut wm, 5);
        assert_eq!(wm.focused_client().unwrap().tags, 5);
    }

    #[test]
    fn test_focus_stack_wraps() {
        let mut wm = wm_with_clients(&["a", "b", "c"]);
        // Tiling order is c, b, a with c focused
        let order: Vec<_> = wm.selmon().clients.iter().map(|c| c.name.clone()).collect();
        assert_eq!(order, ["c", "b", "a"]);

        focus_stack(&mut wm, 1);
        assert_eq!(wm.focused_client().unwrap().name, "b");
        focus_stack(&mut wm, -1);
        focus_stack(&mut wm, -1);
        assert_eq!(wm.focused_client().unwrap().name, "a");
    }

    #[test]
    fn test_zoom_promotes_to_master() {
        let mut wm = wm_with_clients(&["a", "b"]);
        focus_stack(&mut wm, 1);
        assert_eq!(wm.focused_client().unwrap().name, "a");

        zoom(&mut wm);
        assert_eq!(wm.selmon().clients[0].name, "a");
        assert_eq!(wm.focused_client().unwrap().name, "a");

        // Zooming the master promotes the next tiled client
        zoom(&mut wm);
        assert_eq!(wm.selmon().clients[0].name, "b");
    }

    #[test]
    fn test_inc_nmaster_floors_at_zero() {
        let mut wm = wm_with_clients(&[]);
        inc_nmaster(&mut wm, 2);
        assert_eq!(wm.selmon().nmaster, 3);
        inc_nmaster(&mut wm, -10);
        assert_eq!(wm.selmon().nmaster, 0);
    }

    #[test]
    fn test_inc_nmaster_saturates_on_huge_delta() {
        let registry = CommandRegistry::with_defaults();
        let mut wm = wm_with_clients(&["a", "b"]);

        registry
            .dispatch(r#"{"command": "incnmaster", "args": [9223372036854775807]}"#, &mut wm)
            .unwrap();
        assert_eq!(wm.selmon().nmaster, u32::MAX);
        // Every tiled client is a master and spans the full width
        let area = wm.selmon().window_area;
        for client in &wm.selmon().clients {
            assert_eq!(client.geometry.x, area.x);
            assert_eq!(client.geometry.width, area.width - 2 * client.border_width);
        }

        registry
            .dispatch(r#"{"command": "incnmaster", "args": [-9223372036854775808]}"#, &mut wm)
            .unwrap();
        assert_eq!(wm.selmon().nmaster, 0);
    }

    #[test]
    fn test_set_mfact_relative_absolute_and_out_of_range() {
        let mut wm = wm_with_clients(&[]);
        set_mfact(&mut wm, 0.05);
        assert!((wm.selmon().mfact - 0.60).abs() < 1e-5);

        set_mfact(&mut wm, 1.3);
        assert!((wm.selmon().mfact - 0.30).abs() < 1e-5);

        set_mfact(&mut wm, 0.9);
        assert!((wm.selmon().mfact - 0.30).abs() < 1e-5);
    }

    #[test]
    fn test_set_mfact_ignored_in_floating_layout() {
        let mut wm = wm_with_clients(&[]);
        set_layout_safe(&mut wm, Some(1));
        set_mfact(&mut wm, 0.1);
        assert!((wm.selmon().mfact - 0.55).abs() < 1e-5);
    }

    #[test]
    fn test_set_layout_safe() {
        let mut wm = wm_with_clients(&[]);
        set_layout_safe(&mut wm, Some(2));
        assert_eq!(wm.selmon().layout_id(), 2);
        assert_eq!(wm.selmon().layout_symbol, "[M]");
        assert_eq!(wm.selmon().previous_layout_id(), 0);

        // Same layout again stays put
        set_layout_safe(&mut wm, Some(2));
        assert_eq!(wm.selmon().layout_id(), 2);

        // No id toggles back
        set_layout_safe(&mut wm, None);
        assert_eq!(wm.selmon().layout_id(), 0);
        assert_eq!(wm.selmon().layout_symbol, "[]=");
    }

    #[test]
    fn test_set_layout_safe_ignores_unknown_id() {
        let mut wm = wm_with_clients(&[]);
        set_layout_safe(&mut wm, Some(99));
        assert_eq!(wm.selmon().layout_id(), 0);
        assert_eq!(wm.selmon().sellt, 0);
    }

    #[test]
    fn test_toggle_floating_and_fullscreen() {
        let mut wm = wm_with_clients(&["a"]);
        toggle_floating(&mut wm);
        assert!(wm.focused_client().unwrap().flags.floating);

        toggle_fullscreen(&mut wm);
        assert!(wm.focused_client().unwrap().flags.fullscreen);

        // Fullscreen blocks floating toggles
        toggle_floating(&mut wm);
        assert!(wm.focused_client().unwrap().flags.floating);
    }

    #[test]
    fn test_kill_client() {
        let mut wm = wm_with_clients(&["a", "b"]);
        kill_client(&mut wm);
        assert_eq!(wm.selmon().clients.len(), 1);
        assert_eq!(wm.focused_client().unwrap().name, "a");
    }

    #[test]
    fn test_focus_and_tag_monitor() {
        let mut wm = dual_monitor();
        wm.manage(&ClientConfig::new("a"));

        tag_monitor(&mut wm, 1);
        assert_eq!(wm.monitors[1].clients.len(), 1);
        assert_eq!(wm.selected_monitor, 0);

        focus_monitor(&mut wm, -1);
        assert_eq!(wm.selected_monitor, 1);
        assert_eq!(wm.focused_client().unwrap().name, "a");
    }

    #[test]
    fn test_monitor_commands_need_two_monitors() {
        let mut wm = wm_with_clients(&["a"]);
        focus_monitor(&mut wm, 1);
        tag_monitor(&mut wm, 1);
        assert_eq!(wm.selected_monitor, 0);
        assert_eq!(wm.selmon().clients.len(), 1);
    }

    #[test]
    fn test_quit_via_registry() {
        let registry = CommandRegistry::with_defaults();
        let mut wm = wm_with_clients(&[]);
        registry.dispatch(r#"{"command": "quit"}"#, &mut wm).unwrap();
        assert!(!wm.running);
    }
}
