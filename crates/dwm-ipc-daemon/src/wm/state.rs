//! Headless window-manager state
//!
//! Monitors own their clients. Each monitor keeps two orderings of the same
//! windows: `clients` (attach order, newest first, which is also the tiling
//! order) and `stack` (focus order, most recently focused first).

use dwm_ipc_config::{ClientConfig, Config, MonitorConfig, OptionalFlag};
use serde::Serialize;

/// X11-style window identifier
pub type WindowId = u64;

const FIRST_BAR_WINDOW: WindowId = 0x0040_0001;
const FIRST_CLIENT_WINDOW: WindowId = 0x0060_0001;
const DEFAULT_BORDER_WIDTH: i32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// ICCCM size hints as last read from the client
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SizeHints {
    pub base_width: i32,
    pub base_height: i32,
    pub inc_width: i32,
    pub inc_height: i32,
    pub max_width: i32,
    pub max_height: i32,
    pub min_width: i32,
    pub min_height: i32,
    pub min_aspect: f32,
    pub max_aspect: f32,
}

impl SizeHints {
    /// A client whose min and max sizes are equal cannot be resized
    pub fn is_fixed(&self) -> bool {
        self.max_width > 0
            && self.max_height > 0
            && self.max_width == self.min_width
            && self.max_height == self.min_height
    }
}

/// Boolean client state, compared by value between publisher cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientFlags {
    pub fixed: bool,
    pub floating: bool,
    pub urgent: bool,
    pub never_focus: bool,
    pub fullscreen: bool,
    pub fake_fullscreen: bool,
    pub sticky: bool,
    pub hidden: bool,
    pub game: bool,
    pub panel: bool,
    pub always_on_top: bool,
}

/// Which feature-gated flags this build reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnabledFlags {
    pub fake_fullscreen: bool,
    pub sticky: bool,
    pub hidden: bool,
    pub game: bool,
    pub panel: bool,
    pub always_on_top: bool,
}

impl EnabledFlags {
    pub fn from_flags(flags: &[OptionalFlag]) -> Self {
        let mut enabled = Self::default();
        for flag in flags {
            match flag {
                OptionalFlag::FakeFullscreen => enabled.fake_fullscreen = true,
                OptionalFlag::Sticky => enabled.sticky = true,
                OptionalFlag::Hidden => enabled.hidden = true,
                OptionalFlag::Game => enabled.game = true,
                OptionalFlag::Panel => enabled.panel = true,
                OptionalFlag::AlwaysOnTop => enabled.always_on_top = true,
            }
        }
        enabled
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub window: WindowId,
    pub name: String,
    pub pid: u32,
    pub tags: u32,
    /// Number of the owning monitor
    pub monitor: usize,
    pub geometry: Rect,
    pub old_geometry: Rect,
    pub hints: SizeHints,
    pub border_width: i32,
    pub old_border_width: i32,
    pub flags: ClientFlags,
}

/// Tag bitsets of one monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TagState {
    pub selected: u32,
    pub occupied: u32,
    pub urgent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Monitor {
    pub num: usize,
    pub mfact: f32,
    pub nmaster: u32,
    /// Full screen area
    pub screen: Rect,
    /// Area left for clients once the bar is placed
    pub window_area: Rect,
    pub bar_y: i32,
    pub bar_height: i32,
    pub show_bar: bool,
    pub top_bar: bool,
    pub bar_window: WindowId,
    pub tagset: [u32; 2],
    pub seltags: usize,
    /// Layout ids (indices into `WmState::layouts`)
    pub layouts: [usize; 2],
    pub sellt: usize,
    pub layout_symbol: String,
    pub clients: Vec<Client>,
    pub stack: Vec<WindowId>,
    pub selected: Option<WindowId>,
}

impl Monitor {
    fn from_config(num: usize, config: &MonitorConfig, bar_window: WindowId, layouts: &[Layout]) -> Self {
        let mut monitor = Self {
            num,
            mfact: config.mfact,
            nmaster: config.nmaster,
            screen: Rect::new(config.x, config.y, config.width, config.height),
            window_area: Rect::default(),
            bar_y: 0,
            bar_height: config.bar_height,
            show_bar: config.show_bar,
            top_bar: config.top_bar,
            bar_window,
            tagset: [1, 1],
            seltags: 0,
            layouts: [0, 1 % layouts.len().max(1)],
            sellt: 0,
            layout_symbol: layouts.first().map(|l| l.symbol.clone()).unwrap_or_default(),
            clients: Vec::new(),
            stack: Vec::new(),
            selected: None,
        };
        monitor.update_bar_position();
        monitor
    }

    /// Recompute the bar position and the client area
    pub fn update_bar_position(&mut self) {
        self.window_area = self.screen;
        if self.show_bar {
            self.window_area.height -= self.bar_height;
            if self.top_bar {
                self.bar_y = self.screen.y;
                self.window_area.y = self.screen.y + self.bar_height;
            } else {
                self.bar_y = self.screen.y + self.window_area.height;
            }
        } else {
            self.bar_y = -self.bar_height;
        }
    }

    pub fn selected_tags(&self) -> u32 {
        self.tagset[self.seltags]
    }

    pub fn layout_id(&self) -> usize {
        self.layouts[self.sellt]
    }

    pub fn previous_layout_id(&self) -> usize {
        self.layouts[self.sellt ^ 1]
    }

    /// Whether the current layout positions clients itself
    pub fn is_arranged(&self) -> bool {
        matches!(self.layout_symbol.as_str(), "[]=" | "[M]")
    }

    pub fn is_visible(&self, client: &Client) -> bool {
        client.tags & self.selected_tags() != 0
    }

    pub fn tag_state(&self) -> TagState {
        let mut state = TagState {
            selected: self.selected_tags(),
            ..TagState::default()
        };
        for client in &self.clients {
            state.occupied |= client.tags;
            if client.flags.urgent {
                state.urgent |= client.tags;
            }
        }
        state
    }

    pub fn client(&self, window: WindowId) -> Option<&Client> {
        self.clients.iter().find(|c| c.window == window)
    }

    pub fn selected_client(&self) -> Option<&Client> {
        self.selected.and_then(|w| self.client(w))
    }

    fn client_mut(&mut self, window: WindowId) -> Option<&mut Client> {
        self.clients.iter_mut().find(|c| c.window == window)
    }

    pub(crate) fn detach(&mut self, window: WindowId) -> Option<Client> {
        let index = self.clients.iter().position(|c| c.window == window)?;
        self.stack.retain(|&w| w != window);
        if self.selected == Some(window) {
            self.selected = None;
        }
        Some(self.clients.remove(index))
    }

    pub(crate) fn attach(&mut self, client: Client) {
        self.stack.insert(0, client.window);
        self.clients.insert(0, client);
    }

    /// Tile visible, non-floating clients: masters on the left, the rest
    /// stacked on the right
    fn tile(&mut self) {
        let area = self.window_area;
        let selected_tags = self.selected_tags();
        let tiled: Vec<usize> = self
            .clients
            .iter()
            .enumerate()
            .filter(|(_, c)| c.tags & selected_tags != 0 && !c.flags.floating && !c.flags.fullscreen)
            .map(|(i, _)| i)
            .collect();

        let n = tiled.len() as i32;
        if n == 0 {
            return;
        }
        let nmaster = i32::try_from(self.nmaster).unwrap_or(i32::MAX);
        let master_width = if n > nmaster {
            if nmaster > 0 {
                (area.width as f32 * self.mfact) as i32
            } else {
                0
            }
        } else {
            area.width
        };

        let (mut master_y, mut stack_y) = (0, 0);
        for (i, &index) in tiled.iter().enumerate() {
            let i = i as i32;
            let client = &mut self.clients[index];
            let bw = client.border_width;
            let rect = if i < nmaster {
                let h = (area.height - master_y) / (n.min(nmaster) - i);
                let rect = Rect::new(area.x, area.y + master_y, master_width - 2 * bw, h - 2 * bw);
                master_y += h;
                rect
            } else {
                let h = (area.height - stack_y) / (n - i);
                let rect = Rect::new(
                    area.x + master_width,
                    area.y + stack_y,
                    area.width - master_width - 2 * bw,
                    h - 2 * bw,
                );
                stack_y += h;
                rect
            };
            resize(client, rect);
        }
    }

    fn monocle(&mut self) {
        let area = self.window_area;
        let selected_tags = self.selected_tags();
        for client in self
            .clients
            .iter_mut()
            .filter(|c| c.tags & selected_tags != 0 && !c.flags.floating && !c.flags.fullscreen)
        {
            let bw = client.border_width;
            resize(client, Rect::new(area.x, area.y, area.width - 2 * bw, area.height - 2 * bw));
        }
    }
}

fn resize(client: &mut Client, rect: Rect) {
    if client.geometry != rect {
        client.old_geometry = client.geometry;
        client.geometry = rect;
    }
}

/// Everything the IPC core reads, and the command callbacks mutate
#[derive(Debug, Clone)]
pub struct WmState {
    pub tags: Vec<String>,
    pub layouts: Vec<Layout>,
    pub monitors: Vec<Monitor>,
    /// Index of the focused monitor
    pub selected_monitor: usize,
    pub enabled_flags: EnabledFlags,
    /// Cleared by the `quit` command
    pub running: bool,
    next_window: WindowId,
}

impl WmState {
    pub fn from_config(config: &Config) -> Self {
        let layouts: Vec<Layout> = config
            .layouts
            .iter()
            .map(|symbol| Layout {
                symbol: symbol.clone(),
            })
            .collect();

        let monitors = config
            .monitors
            .iter()
            .enumerate()
            .map(|(num, mc)| Monitor::from_config(num, mc, FIRST_BAR_WINDOW + num as WindowId, &layouts))
            .collect();

        let mut wm = Self {
            tags: config.tags.clone(),
            layouts,
            monitors,
            selected_monitor: 0,
            enabled_flags: EnabledFlags::from_flags(&config.client_flags),
            running: true,
            next_window: FIRST_CLIENT_WINDOW,
        };

        for client in &config.clients {
            wm.manage(client);
        }
        // Seeded clients are attached newest-first; focus the first declared one
        if let Some(first) = config.clients.first() {
            let window = wm
                .monitors
                .iter()
                .flat_map(|m| m.clients.iter())
                .find(|c| c.name == first.name)
                .map(|c| c.window);
            if let Some(window) = window {
                wm.focus(Some(window));
            }
        }

        wm
    }

    /// Bitmask covering every configured tag
    pub fn tag_mask(&self) -> u32 {
        match self.tags.len() {
            0 => 0,
            n => u32::MAX >> (32 - n.min(32)),
        }
    }

    pub fn selmon(&self) -> &Monitor {
        &self.monitors[self.selected_monitor]
    }

    pub fn selmon_mut(&mut self) -> &mut Monitor {
        &mut self.monitors[self.selected_monitor]
    }

    pub fn client(&self, window: WindowId) -> Option<&Client> {
        self.monitors.iter().find_map(|m| m.client(window))
    }

    pub fn client_mut(&mut self, window: WindowId) -> Option<&mut Client> {
        self.monitors.iter_mut().find_map(|m| m.client_mut(window))
    }

    /// Focused client of the focused monitor
    pub fn focused_client(&self) -> Option<&Client> {
        self.selmon().selected_client()
    }

    /// Find a client by name: exact match first, then a case-insensitive
    /// substring match, scanning monitors in order
    pub fn find_client_by_name(&self, name: &str) -> Option<&Client> {
        let all = || self.monitors.iter().flat_map(|m| m.clients.iter().rev());
        all().find(|c| c.name == name).or_else(|| {
            let needle = name.to_lowercase();
            all().find(|c| c.name.to_lowercase().contains(&needle))
        })
    }

    /// Start managing a new client and focus it
    pub fn manage(&mut self, seed: &ClientConfig) -> WindowId {
        let window = self.next_window;
        self.next_window += 1;

        let monitor_num = seed.monitor.min(self.monitors.len().saturating_sub(1));
        let tag_mask = self.tag_mask();
        let monitor = &mut self.monitors[monitor_num];
        let tags = match seed.tags & tag_mask {
            0 => monitor.selected_tags(),
            tags => tags,
        };

        let geometry = monitor.window_area;
        let client = Client {
            window,
            name: seed.name.clone(),
            pid: seed.pid,
            tags,
            monitor: monitor_num,
            geometry,
            old_geometry: geometry,
            hints: SizeHints::default(),
            border_width: DEFAULT_BORDER_WIDTH,
            old_border_width: DEFAULT_BORDER_WIDTH,
            flags: ClientFlags {
                floating: seed.floating,
                urgent: seed.urgent,
                ..ClientFlags::default()
            },
        };
        monitor.attach(client);

        if seed.fullscreen {
            self.set_fullscreen(window, true);
        }
        self.focus(Some(window));
        self.arrange(monitor_num);
        window
    }

    /// Stop managing a client
    pub fn unmanage(&mut self, window: WindowId) -> Option<Client> {
        let monitor_num = self.client(window)?.monitor;
        let client = self.monitors[monitor_num].detach(window);
        self.focus(None);
        self.arrange(monitor_num);
        client
    }

    /// Focus a client, or the topmost visible client of the focused monitor
    ///
    /// Focusing a client on another monitor makes that monitor focused.
    /// Focusing clears the client's urgency.
    pub fn focus(&mut self, window: Option<WindowId>) {
        let target = window.and_then(|w| {
            let client = self.client(w)?;
            let monitor = &self.monitors[client.monitor];
            monitor.is_visible(client).then_some((w, client.monitor))
        });

        let (window, monitor_num) = match target {
            Some(target) => target,
            None => {
                let monitor = self.selmon();
                let topmost = monitor
                    .stack
                    .iter()
                    .copied()
                    .find(|&w| monitor.client(w).is_some_and(|c| monitor.is_visible(c)));
                match topmost {
                    Some(w) => (w, self.selected_monitor),
                    None => {
                        self.selmon_mut().selected = None;
                        return;
                    }
                }
            }
        };

        self.selected_monitor = monitor_num;
        let monitor = &mut self.monitors[monitor_num];
        monitor.stack.retain(|&w| w != window);
        monitor.stack.insert(0, window);
        monitor.selected = Some(window);
        if let Some(client) = monitor.client_mut(window) {
            client.flags.urgent = false;
        }
    }

    pub fn set_fullscreen(&mut self, window: WindowId, fullscreen: bool) {
        let Some(monitor_num) = self.client(window).map(|c| c.monitor) else {
            return;
        };
        let screen = self.monitors[monitor_num].screen;
        let Some(client) = self.client_mut(window) else {
            return;
        };
        if client.flags.fullscreen == fullscreen {
            return;
        }

        client.flags.fullscreen = fullscreen;
        if fullscreen {
            client.old_border_width = client.border_width;
            client.border_width = 0;
            resize(client, screen);
        } else {
            client.border_width = client.old_border_width;
            let previous = client.old_geometry;
            resize(client, previous);
        }
        self.arrange(monitor_num);
    }

    /// Move a client to another monitor, onto that monitor's visible tags
    pub fn send_to_monitor(&mut self, window: WindowId, target: usize) {
        let Some(source) = self.client(window).map(|c| c.monitor) else {
            return;
        };
        if source == target || target >= self.monitors.len() {
            return;
        }
        let Some(mut client) = self.monitors[source].detach(window) else {
            return;
        };

        client.monitor = target;
        client.tags = self.monitors[target].selected_tags();
        self.monitors[target].attach(client);

        self.focus(None);
        self.arrange(source);
        self.arrange(target);
    }

    /// Monitor number in direction `dir` from the focused one, wrapping
    pub fn monitor_in_direction(&self, dir: i64) -> usize {
        let count = self.monitors.len();
        if dir > 0 {
            (self.selected_monitor + 1) % count
        } else {
            (self.selected_monitor + count - 1) % count
        }
    }

    /// Re-apply the current layout of a monitor
    pub fn arrange(&mut self, monitor_num: usize) {
        let Some(symbol) = self
            .monitors
            .get(monitor_num)
            .and_then(|m| self.layouts.get(m.layout_id()))
            .map(|l| l.symbol.clone())
        else {
            return;
        };

        let monitor = &mut self.monitors[monitor_num];
        monitor.layout_symbol = symbol;
        match monitor.layout_symbol.as_str() {
            "[]=" => monitor.tile(),
            "[M]" => monitor.monocle(),
            // Floating: clients stay where they are
            _ => {}
        }
    }
}
