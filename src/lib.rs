use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use std::str::FromStr;
use wasm_bindgen::prelude::*;

pub const SIZE: usize = 4;
const TILE_SIZE: u32 = 100;
const DEFAULT_SPAWN_TWO_PROBABILITY: f64 = 0.9;
const DEFAULT_HIGH_SCORE_KEY: &str = "highScore";
const EMPTY_COLOR: &str = "#cdc1b4";
const OVERFLOW_COLOR: &str = "#3c3a32";
const LABEL_FONT: &str = "20px Arial";
const LABEL_COLOR: &str = "black";
const GAME_OVER_MESSAGE: &str = "Game Over! Try Again!";

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
}

// JS imports abort off wasm, so native builds and tests log nothing.
#[cfg(target_arch = "wasm32")]
fn log(msg: &str) {
    web_sys::console::log_1(&JsValue::from_str(msg));
}

#[cfg(not(target_arch = "wasm32"))]
fn log(_msg: &str) {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub fn all() -> [Direction; 4] {
        [
            Direction::Left,
            Direction::Right,
            Direction::Up,
            Direction::Down,
        ]
    }

    // offset 0 is the edge tiles slide toward
    fn cell(self, line: usize, offset: usize) -> (usize, usize) {
        match self {
            Direction::Left => (line, offset),
            Direction::Right => (line, SIZE - 1 - offset),
            Direction::Up => (offset, line),
            Direction::Down => (SIZE - 1 - offset, line),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(format!("unknown direction {other:?}")),
        }
    }
}

// 0 is an empty cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Grid {
    cells: [[u32; SIZE]; SIZE],
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(cells: [[u32; SIZE]; SIZE]) -> Self {
        Self { cells }
    }

    pub fn rows(&self) -> &[[u32; SIZE]; SIZE] {
        &self.cells
    }

    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.cells[row][col]
    }

    pub fn empty_cells(&self) -> Vec<(usize, usize)> {
        let mut empty = Vec::new();
        for r in 0..SIZE {
            for c in 0..SIZE {
                if self.cells[r][c] == 0 {
                    empty.push((r, c));
                }
            }
        }
        empty
    }

    pub fn tile_count(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|&&value| value != 0)
            .count()
    }

    fn lines(&self, direction: Direction) -> [[u32; SIZE]; SIZE] {
        let mut lines = [[0; SIZE]; SIZE];
        for (i, line) in lines.iter_mut().enumerate() {
            for (j, slot) in line.iter_mut().enumerate() {
                let (r, c) = direction.cell(i, j);
                *slot = self.cells[r][c];
            }
        }
        lines
    }

    fn from_lines(direction: Direction, lines: &[[u32; SIZE]; SIZE]) -> Self {
        let mut grid = Grid::new();
        for (i, line) in lines.iter().enumerate() {
            for (j, &value) in line.iter().enumerate() {
                let (r, c) = direction.cell(i, j);
                grid.cells[r][c] = value;
            }
        }
        grid
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveOutcome {
    pub grid: Grid,
    pub points: u32,
    pub changed: bool,
}

pub fn apply_move(grid: &Grid, direction: Direction) -> MoveOutcome {
    let mut lines = grid.lines(direction);
    let mut points: u32 = 0;
    for line in lines.iter_mut() {
        let (slid, gained) = slide_line(*line);
        *line = slid;
        points = points.saturating_add(gained);
    }
    let next = Grid::from_lines(direction, &lines);
    MoveOutcome {
        grid: next,
        points,
        changed: next != *grid,
    }
}

fn slide_line(line: [u32; SIZE]) -> ([u32; SIZE], u32) {
    let mut dense: Vec<u32> = line.iter().copied().filter(|&v| v != 0).collect();
    let mut points: u32 = 0;
    for j in 0..dense.len().saturating_sub(1) {
        // A merged tile zeroes its right neighbour, which blocks a second merge.
        if dense[j] == 0 || dense[j] != dense[j + 1] {
            continue;
        }
        // 2^31 tiles stay put rather than overflow.
        if let Some(doubled) = dense[j].checked_mul(2) {
            dense[j] = doubled;
            points = points.saturating_add(doubled);
            dense[j + 1] = 0;
        }
    }
    let mut out = [0; SIZE];
    for (slot, value) in out.iter_mut().zip(dense.into_iter().filter(|&v| v != 0)) {
        *slot = value;
    }
    (out, points)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpawnedTile {
    pub row: usize,
    pub col: usize,
    pub value: u32,
}

pub fn spawn_tile<R: Rng + ?Sized>(
    grid: &mut Grid,
    rng: &mut R,
    two_probability: f64,
) -> Option<SpawnedTile> {
    let empty = grid.empty_cells();
    let &(row, col) = empty.choose(rng)?;
    let value = if rng.gen_bool(sanitize_probability(two_probability)) {
        2
    } else {
        4
    };
    grid.cells[row][col] = value;
    Some(SpawnedTile { row, col, value })
}

fn sanitize_probability(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        DEFAULT_SPAWN_TWO_PROBABILITY
    }
}

pub fn is_terminal(grid: &Grid) -> bool {
    for r in 0..SIZE {
        for c in 0..SIZE {
            let value = grid.cells[r][c];
            if value == 0 {
                return false;
            }
            if c + 1 < SIZE && value == grid.cells[r][c + 1] {
                return false;
            }
            if r + 1 < SIZE && value == grid.cells[r + 1][c] {
                return false;
            }
        }
    }
    true
}

#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
pub enum GameStatus {
    InProgress,
    Over,
}

pub trait HighScoreStore {
    // 0 when nothing usable is stored
    fn load(&self) -> u32;
    fn save(&mut self, score: u32);
}

fn parse_high_score(raw: &str) -> u32 {
    raw.trim().parse().unwrap_or(0)
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    value: Option<u32>,
    saves: Vec<u32>,
}

impl MemoryStore {
    pub fn with_value(value: u32) -> Self {
        Self {
            value: Some(value),
            saves: Vec::new(),
        }
    }

    pub fn saves(&self) -> &[u32] {
        &self.saves
    }
}

impl HighScoreStore for MemoryStore {
    fn load(&self) -> u32 {
        self.value.unwrap_or(0)
    }

    fn save(&mut self, score: u32) {
        self.value = Some(score);
        self.saves.push(score);
    }
}

#[derive(Clone, Debug)]
pub struct LocalStorageStore {
    key: String,
}

impl LocalStorageStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    #[cfg(target_arch = "wasm32")]
    fn storage() -> Option<web_sys::Storage> {
        web_sys::window().and_then(|window| window.local_storage().ok().flatten())
    }
}

impl HighScoreStore for LocalStorageStore {
    #[cfg(target_arch = "wasm32")]
    fn load(&self) -> u32 {
        let Some(storage) = Self::storage() else {
            return 0;
        };
        storage
            .get_item(&self.key)
            .ok()
            .flatten()
            .map(|raw| parse_high_score(&raw))
            .unwrap_or(0)
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn load(&self) -> u32 {
        0
    }

    #[cfg(target_arch = "wasm32")]
    fn save(&mut self, score: u32) {
        let Some(storage) = Self::storage() else {
            log("high score: storage unavailable");
            return;
        };
        if storage.set_item(&self.key, &score.to_string()).is_err() {
            log("high score: storage set failed");
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn save(&mut self, _score: u32) {}
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum TileTheme {
    Numeric,
    Clock,
}

impl Default for TileTheme {
    fn default() -> Self {
        TileTheme::Clock
    }
}

impl TileTheme {
    pub fn label(self, value: u32) -> Option<String> {
        if value == 0 {
            return None;
        }
        let word = match self {
            TileTheme::Numeric => None,
            TileTheme::Clock => clock_word(value),
        };
        Some(word.map_or_else(|| value.to_string(), str::to_string))
    }
}

fn clock_word(value: u32) -> Option<&'static str> {
    match value {
        2 => Some("Seconds"),
        4 => Some("Minutes"),
        8 => Some("Hour"),
        16 => Some("Day"),
        32 => Some("Week"),
        64 => Some("Month"),
        128 => Some("Year"),
        256 => Some("Decade"),
        512 => Some("Century"),
        1024 => Some("Millennium"),
        _ => None,
    }
}

pub fn tile_color(value: u32) -> &'static str {
    match value {
        0 => EMPTY_COLOR,
        2 => "#eee4da",
        4 => "#ede0c8",
        8 => "#f2b179",
        16 => "#f59563",
        32 => "#f67c5f",
        64 => "#f65e3b",
        128 => "#edcf72",
        256 => "#edcc61",
        512 => "#edc850",
        1024 => "#edc53f",
        _ => OVERFLOW_COLOR,
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct ControlBindings {
    pub left: String,
    pub right: String,
    pub up: String,
    pub down: String,
}

impl Default for ControlBindings {
    fn default() -> Self {
        Self {
            left: "ArrowLeft".to_string(),
            right: "ArrowRight".to_string(),
            up: "ArrowUp".to_string(),
            down: "ArrowDown".to_string(),
        }
    }
}

impl ControlBindings {
    pub fn direction_for(&self, key: &str) -> Option<Direction> {
        if key == self.left {
            Some(Direction::Left)
        } else if key == self.right {
            Some(Direction::Right)
        } else if key == self.up {
            Some(Direction::Up)
        } else if key == self.down {
            Some(Direction::Down)
        } else {
            None
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct GameSettings {
    pub spawn_two_probability: f64,
    pub high_score_key: String,
    pub theme: TileTheme,
    pub controls: ControlBindings,
    pub seed: Option<u64>,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            spawn_two_probability: DEFAULT_SPAWN_TWO_PROBABILITY,
            high_score_key: DEFAULT_HIGH_SCORE_KEY.to_string(),
            theme: TileTheme::default(),
            controls: ControlBindings::default(),
            seed: None,
        }
    }
}

impl GameSettings {
    pub fn spawn_two_probability(&self) -> f64 {
        sanitize_probability(self.spawn_two_probability)
    }
}

#[derive(Clone, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CellView {
    pub row: usize,
    pub col: usize,
    pub value: u32,
    pub fill: &'static str,
    pub label: Option<String>,
}

#[derive(Clone, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub size: usize,
    pub tile_size: u32,
    pub canvas_size: u32,
    pub font: &'static str,
    pub label_color: &'static str,
    pub cells: Vec<CellView>,
    pub score: u32,
    pub high_score: u32,
    pub status: GameStatus,
    pub message: &'static str,
    pub show_reset: bool,
}

#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum TurnOutcome {
    Ignored,
    Unchanged,
    Moved {
        points: u32,
        #[serde(rename = "newHighScore")]
        new_high_score: bool,
        #[serde(rename = "gameOver")]
        game_over: bool,
    },
}

#[derive(Serialize)]
pub struct TurnView {
    pub outcome: TurnOutcome,
    pub board: BoardView,
}

pub struct Session<S, R> {
    grid: Grid,
    score: u32,
    high_score: u32,
    status: GameStatus,
    settings: GameSettings,
    store: S,
    rng: R,
}

impl<S: HighScoreStore, R: Rng> Session<S, R> {
    pub fn new(settings: GameSettings, store: S, rng: R) -> Self {
        let high_score = store.load();
        let mut session = Self {
            grid: Grid::new(),
            score: 0,
            high_score,
            status: GameStatus::InProgress,
            settings,
            store,
            rng,
        };
        session.reset();
        session
    }

    pub fn reset(&mut self) {
        self.grid = Grid::new();
        self.score = 0;
        self.status = GameStatus::InProgress;
        let two_probability = self.settings.spawn_two_probability();
        for _ in 0..2 {
            spawn_tile(&mut self.grid, &mut self.rng, two_probability);
        }
        log(&format!("new game (high score {})", self.high_score));
    }

    pub fn handle_key(&mut self, key: &str) -> TurnOutcome {
        match self.settings.controls.direction_for(key) {
            Some(direction) => self.handle_input(direction),
            None => TurnOutcome::Ignored,
        }
    }

    pub fn handle_input(&mut self, direction: Direction) -> TurnOutcome {
        if self.status == GameStatus::Over {
            return TurnOutcome::Ignored;
        }
        let outcome = apply_move(&self.grid, direction);
        if !outcome.changed {
            return TurnOutcome::Unchanged;
        }
        self.grid = outcome.grid;
        self.score = self.score.saturating_add(outcome.points);
        let new_high_score = self.score > self.high_score;
        if new_high_score {
            self.high_score = self.score;
            self.store.save(self.high_score);
        }
        spawn_tile(
            &mut self.grid,
            &mut self.rng,
            self.settings.spawn_two_probability(),
        );
        let game_over = is_terminal(&self.grid);
        if game_over {
            self.status = GameStatus::Over;
            log(&format!("game over at score {}", self.score));
        }
        TurnOutcome::Moved {
            points: outcome.points,
            new_high_score,
            game_over,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn high_score(&self) -> u32 {
        self.high_score
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn message(&self) -> &'static str {
        match self.status {
            GameStatus::InProgress => "",
            GameStatus::Over => GAME_OVER_MESSAGE,
        }
    }

    pub fn snapshot(&self) -> BoardView {
        let theme = self.settings.theme;
        let mut cells = Vec::with_capacity(SIZE * SIZE);
        for (row, values) in self.grid.rows().iter().enumerate() {
            for (col, &value) in values.iter().enumerate() {
                cells.push(CellView {
                    row,
                    col,
                    value,
                    fill: tile_color(value),
                    label: theme.label(value),
                });
            }
        }
        BoardView {
            size: SIZE,
            tile_size: TILE_SIZE,
            canvas_size: TILE_SIZE * SIZE as u32,
            font: LABEL_FONT,
            label_color: LABEL_COLOR,
            cells,
            score: self.score,
            high_score: self.high_score,
            status: self.status,
            message: self.message(),
            show_reset: self.status == GameStatus::Over,
        }
    }
}


#[wasm_bindgen]
pub struct GameClient {
    session: Session<LocalStorageStore, StdRng>,
}

#[wasm_bindgen]
impl GameClient {
    #[wasm_bindgen(constructor)]
    pub fn new(settings: JsValue) -> Result<GameClient, JsValue> {
        let settings: GameSettings = from_value(settings).unwrap_or_default();
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let store = LocalStorageStore::new(settings.high_score_key.clone());
        Ok(Self {
            session: Session::new(settings, store, rng),
        })
    }

    #[wasm_bindgen(js_name = keyDown)]
    pub fn key_down(&mut self, key: &str) -> Result<JsValue, JsValue> {
        let outcome = self.session.handle_key(key);
        self.turn_view(outcome)
    }

    #[wasm_bindgen(js_name = applyMove)]
    pub fn apply_move(&mut self, direction: &str) -> Result<JsValue, JsValue> {
        let outcome = match direction.parse::<Direction>() {
            Ok(direction) => self.session.handle_input(direction),
            Err(_) => TurnOutcome::Ignored,
        };
        self.turn_view(outcome)
    }

    pub fn reset(&mut self) -> Result<JsValue, JsValue> {
        self.session.reset();
        self.snapshot()
    }

    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        to_value(&self.session.snapshot()).map_err(|e| e.into())
    }

    #[wasm_bindgen(js_name = snapshotJson)]
    pub fn snapshot_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.session.snapshot()).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

impl GameClient {
    fn turn_view(&self, outcome: TurnOutcome) -> Result<JsValue, JsValue> {
        if let TurnOutcome::Moved {
            new_high_score: true,
            ..
        } = outcome
        {
            log(&format!("new high score {}", self.session.high_score()));
        }
        let view = TurnView {
            outcome,
            board: self.session.snapshot(),
        };
        to_value(&view).map_err(|e| e.into())
    }
}
