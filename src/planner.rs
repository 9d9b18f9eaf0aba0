//! Tile grid planning
//!
//! Turns the viewport into an ordered list of tile requests: for each
//! visible page a thumbnail followed by its visible stripes, then thumbnail
//! preloads around the visible pages, then directional stripe preloads. Full
//! tiles get increasing priority orders starting at 1 and are capped by the
//! per-pass budget.

use std::collections::HashSet;

use crate::config::EngineConfig;
use crate::geometry::{RelRect, snap_ceil, snap_floor};
use crate::pages::PageOrder;
use crate::render::DispatcherKind;
use crate::tile::TileKey;
use crate::viewport::{ScrollDirection, Viewport};

/// One step of a load pass, in submission order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlannedRequest {
    /// Full-resolution tile for the primary dispatcher
    Tile { key: TileKey, order: u64 },
    Thumbnail {
        key: TileKey,
        dispatcher: DispatcherKind,
    },
}

impl PlannedRequest {
    #[must_use]
    pub fn key(&self) -> &TileKey {
        match self {
            Self::Tile { key, .. } | Self::Thumbnail { key, .. } => key,
        }
    }
}

/// Partition of every page into tiles at the current zoom.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileGrid {
    pub cols: usize,
    pub rows: usize,
    /// On-screen size of one tile column
    pub col_width: f32,
    /// On-screen size of one tile row
    pub row_height: f32,
    /// Page fraction covered by one column
    pub rel_width: f32,
    /// Page fraction covered by one row
    pub rel_height: f32,
    /// Pixel width of a whole page rendered at tile resolution
    pub render_width: f32,
    pub render_height: f32,
}

impl TileGrid {
    /// Grid whose tiles cover about `tile_size` device pixels a side.
    #[must_use]
    pub fn compute(viewport: &Viewport, tile_size: f32) -> Option<Self> {
        let optimal = viewport.optimal_page_size();
        if optimal.is_empty() || tile_size <= 0.0 {
            return None;
        }

        let zoom = viewport.zoom();
        let part_w = (tile_size / optimal.width) / zoom;
        let part_h = (tile_size / optimal.height) / zoom;
        let cols = ((1.0 / part_w).ceil() as usize).max(1);
        let rows = ((1.0 / part_h).ceil() as usize).max(1);

        let scaled = viewport.scaled_page_size();
        let rel_width = 1.0 / cols as f32;
        let rel_height = 1.0 / rows as f32;
        Some(Self {
            cols,
            rows,
            col_width: scaled.width / cols as f32,
            row_height: scaled.height / rows as f32,
            rel_width,
            rel_height,
            render_width: tile_size / rel_width,
            render_height: tile_size / rel_height,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct GridPosition {
    page: i32,
    row: i32,
    col: i32,
}

struct Planner<'a> {
    viewport: &'a Viewport,
    pages: &'a PageOrder,
    config: &'a EngineConfig,
    grid: TileGrid,
    vertical: bool,
    page_count: i32,
    x_offset: f32,
    y_offset: f32,
    thumbnail_width: u32,
    thumbnail_height: u32,
    order: u64,
    emitted: HashSet<TileKey>,
    out: Vec<PlannedRequest>,
}

/// Plan one load pass for `viewport`.
#[must_use]
pub fn plan_pass(
    viewport: &Viewport,
    pages: &PageOrder,
    config: &EngineConfig,
) -> Vec<PlannedRequest> {
    let Some(grid) = TileGrid::compute(viewport, config.tile_size) else {
        return Vec::new();
    };
    if pages.is_empty() {
        return Vec::new();
    }

    let optimal = viewport.optimal_page_size();
    let offset = viewport.offset();
    let mut planner = Planner {
        viewport,
        pages,
        config,
        grid,
        vertical: viewport.orientation().is_vertical(),
        page_count: pages.len() as i32,
        x_offset: offset.x.max(0.0),
        y_offset: offset.y.max(0.0),
        thumbnail_width: (optimal.width * config.thumbnail_ratio) as u32,
        thumbnail_height: (optimal.height * config.thumbnail_ratio) as u32,
        order: 1,
        emitted: HashSet::new(),
        out: Vec::new(),
    };

    let loaded = planner.load_visible();
    let unzoomed = (viewport.zoom() - 1.0).abs() <= f32::EPSILON;
    if unzoomed && pages.len() > 1 && !config.preview_only {
        match viewport.scroll_direction() {
            ScrollDirection::Forward => {
                let loaded = planner.preload_forward(loaded);
                planner.preload_backward(loaded);
            }
            ScrollDirection::Backward => {
                let loaded = planner.preload_backward(loaded);
                planner.preload_forward(loaded);
            }
            ScrollDirection::None => {}
        }
    }
    planner.out
}

impl Planner<'_> {
    fn budget(&self) -> usize {
        self.config.cache_size
    }

    fn along_offset(&self) -> f32 {
        if self.vertical {
            self.y_offset
        } else {
            self.x_offset
        }
    }

    fn document_page(&self, page: i32) -> Option<usize> {
        if page < 0 || page >= self.page_count {
            return None;
        }
        self.pages.document_page(page as usize)
    }

    /// Page, row and column under the strip position `offset`.
    fn position_at(&self, offset: f32) -> GridPosition {
        let page = self.viewport.page_at_offset(offset);
        let outer = self.viewport.along_size(self.viewport.page_outer_size());
        let scaled = self.viewport.along_size(self.viewport.scaled_page_size());

        let start = outer * page as f32 + self.viewport.along_margin();
        let end = start + scaled;
        let page_pos = end.min(offset) - start;

        let (row, col) = if self.vertical {
            let row = if page_pos > 0.0 {
                page_pos / self.grid.row_height
            } else {
                0.0
            };
            (row, self.x_offset / self.grid.col_width)
        } else {
            let col = if page_pos > 0.0 {
                page_pos / self.grid.col_width
            } else {
                0.0
            };
            (self.y_offset / self.grid.row_height, col)
        };

        GridPosition {
            page,
            row: snap_floor(row),
            col: snap_floor(col),
        }
    }

    fn load_visible(&mut self) -> usize {
        let view_along = self.viewport.along_size(self.viewport.view_size());
        let offset = self.along_offset();
        let first = self.position_at(offset);
        let last = self.position_at(offset + view_along - 1.0);
        let stripes_per_page = (if self.vertical {
            self.grid.rows
        } else {
            self.grid.cols
        }) as i32;

        let mut parts = 0;
        let mut loaded_thumbs = 0;
        let last_page = last.page.min(self.page_count - 1);

        for page in first.page.max(0)..=last_page {
            if let Some(document_page) = self.document_page(page) {
                self.load_thumbnail(page as usize, document_page, DispatcherKind::Primary);
                loaded_thumbs += 1;
            }

            if self.config.preview_only {
                continue;
            }

            let (first_along, first_cross) = self.split(first);
            let start = if page == first.page { first_along } else { 0 };
            let end = if page == last.page {
                self.split(last).0 + 1
            } else {
                stripes_per_page
            };

            for along in start..end {
                if parts >= self.budget() {
                    break;
                }
                let position = self.join(page, along, first_cross);
                parts += self.load_stripe(position, self.budget() - parts);
            }
        }

        self.preload_thumbnails(first.page, last.page, loaded_thumbs);
        parts
    }

    /// Thumbnails of pages around the visible range, alternating before and
    /// after, until the thumbnail budget is used.
    fn preload_thumbnails(&mut self, first_page: i32, last_page: i32, mut loaded: usize) {
        let limit = self.config.thumbnail_cache_size;
        let delta_max = (self.page_count - last_page).max(first_page - 1);

        for delta in 1..=delta_max {
            for page in [first_page - delta, last_page + delta] {
                if loaded >= limit {
                    return;
                }
                if let Some(document_page) = self.document_page(page) {
                    self.load_thumbnail(page as usize, document_page, DispatcherKind::Secondary);
                    loaded += 1;
                }
            }
        }
    }

    fn preload_forward(&mut self, mut loaded: usize) -> usize {
        for i in 0..self.config.preload_count {
            if loaded >= self.budget() {
                break;
            }
            loaded += self.load_relative(i as i32, self.budget() - loaded, true);
        }
        loaded
    }

    fn preload_backward(&mut self, mut loaded: usize) -> usize {
        for i in 1..=self.config.preload_count {
            if loaded >= self.budget() {
                break;
            }
            loaded += self.load_relative(-(i as i32), self.budget() - loaded, false);
        }
        loaded
    }

    /// Load the stripe `number` stripes away from the viewport start, or from
    /// its end when `outside_view`.
    fn load_relative(&mut self, number: i32, budget: usize, outside_view: bool) -> usize {
        let item = if self.vertical {
            self.grid.row_height
        } else {
            self.grid.col_width
        };
        let screen = self.viewport.along_size(self.viewport.view_size());
        let outer = self.viewport.along_size(self.viewport.page_outer_size());

        let offset = self.along_offset() + if outside_view { screen } else { 0.0 } + item * number as f32;
        if offset < 0.0 || offset >= self.page_count as f32 * outer {
            return 0;
        }

        let position = self.position_at(offset);
        self.load_stripe(position, budget)
    }

    /// Load the cells of one stripe that cross the viewport, plus one extra.
    fn load_stripe(&mut self, position: GridPosition, budget: usize) -> usize {
        let Some(document_page) = self.document_page(position.page) else {
            return 0;
        };

        let (max, first, stripe_length, item_length) = if self.vertical {
            (
                self.grid.cols as i32,
                position.col,
                self.viewport.view_size().width,
                self.grid.col_width,
            )
        } else {
            (
                self.grid.rows as i32,
                position.row,
                self.viewport.view_size().height,
                self.grid.row_height,
            )
        };
        let per_screen = snap_ceil(stripe_length / item_length);
        let last = (first + per_screen).min(max);

        let mut loaded = 0;
        for i in first.max(0)..=last {
            if loaded >= budget {
                break;
            }
            let (row, col) = if self.vertical {
                (position.row, i)
            } else {
                (i, position.col)
            };
            if self.load_cell(position.page as usize, document_page, row, col) {
                loaded += 1;
            }
        }
        loaded
    }

    fn load_cell(&mut self, page: usize, document_page: usize, row: i32, col: i32) -> bool {
        if row < 0 || col < 0 {
            return false;
        }
        let left = self.grid.rel_width * col as f32;
        let top = self.grid.rel_height * row as f32;
        let right = (left + self.grid.rel_width).min(1.0);
        let bottom = (top + self.grid.rel_height).min(1.0);

        let width = self.grid.render_width * (right - left);
        let height = self.grid.render_height * (bottom - top);
        if width <= 0.0 || height <= 0.0 {
            return false;
        }

        let key = TileKey::part(
            page,
            document_page,
            width,
            height,
            RelRect::new(left, top, right, bottom),
        );
        if !key.has_area() || !self.emitted.insert(key) {
            return false;
        }

        self.out.push(PlannedRequest::Tile {
            key,
            order: self.order,
        });
        self.order += 1;
        true
    }

    fn load_thumbnail(&mut self, page: usize, document_page: usize, dispatcher: DispatcherKind) {
        let key = TileKey::thumbnail(
            page,
            document_page,
            self.thumbnail_width,
            self.thumbnail_height,
        );
        if key.has_area() && self.emitted.insert(key) {
            self.out.push(PlannedRequest::Thumbnail { key, dispatcher });
        }
    }

    /// (along-axis index, cross-axis index) of a position.
    fn split(&self, position: GridPosition) -> (i32, i32) {
        if self.vertical {
            (position.row, position.col)
        } else {
            (position.col, position.row)
        }
    }

    fn join(&self, page: i32, along: i32, cross: i32) -> GridPosition {
        if self.vertical {
            GridPosition {
                page,
                row: along,
                col: cross,
            }
        } else {
            GridPosition {
                page,
                row: cross,
                col: along,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Size};

    fn viewport(config: &EngineConfig, pages: usize) -> Viewport {
        // Optimal page size is 565x800: 3 columns and 4 rows of 256px tiles.
        Viewport::new(
            config,
            Size::new(1000.0, 800.0),
            Size::new(595.0, 842.0),
            pages,
        )
    }

    fn tiles(plan: &[PlannedRequest]) -> Vec<(TileKey, u64)> {
        plan.iter()
            .filter_map(|r| match r {
                PlannedRequest::Tile { key, order } => Some((*key, *order)),
                PlannedRequest::Thumbnail { .. } => None,
            })
            .collect()
    }

    fn thumbnails(plan: &[PlannedRequest]) -> Vec<(usize, DispatcherKind)> {
        plan.iter()
            .filter_map(|r| match r {
                PlannedRequest::Thumbnail { key, dispatcher } => {
                    Some((key.logical_page, *dispatcher))
                }
                PlannedRequest::Tile { .. } => None,
            })
            .collect()
    }

    #[test]
    fn grid_follows_tile_size_and_zoom() {
        let config = EngineConfig::default();
        let mut vp = viewport(&config, 10);
        let grid = TileGrid::compute(&vp, config.tile_size).unwrap();
        assert_eq!((grid.cols, grid.rows), (3, 4));
        assert_eq!(grid.row_height, 200.0);
        assert_eq!(grid.render_height, 1024.0);

        vp.zoom_to(2.0);
        let grid = TileGrid::compute(&vp, config.tile_size).unwrap();
        assert_eq!((grid.cols, grid.rows), (5, 7));
    }

    #[test]
    fn first_pass_requests_thumbnail_then_visible_tiles() {
        let config = EngineConfig::default();
        let vp = viewport(&config, 10);
        let plan = plan_pass(&vp, &PageOrder::identity(10), &config);

        assert_eq!(
            plan[0],
            PlannedRequest::Thumbnail {
                key: TileKey::thumbnail(0, 0, 169, 240),
                dispatcher: DispatcherKind::Primary
            }
        );

        let tiles = tiles(&plan);
        assert_eq!(tiles.len(), 12);
        let orders: Vec<_> = tiles.iter().map(|(_, o)| *o).collect();
        assert_eq!(orders, (1..=12).collect::<Vec<_>>());
        assert!(tiles.iter().all(|(k, _)| k.logical_page == 0));
        assert!(tiles.iter().all(|(k, _)| k.bounds.is_within_page()));
        assert!(
            tiles
                .iter()
                .all(|(k, _)| k.pixel_width == 256 && k.pixel_height == 256)
        );

        let thumbs = thumbnails(&plan);
        assert_eq!(thumbs.len(), config.thumbnail_cache_size);
        assert_eq!(
            thumbs[1..],
            (1..8)
                .map(|p| (p, DispatcherKind::Secondary))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn forward_scroll_preloads_stripes_ahead() {
        let config = EngineConfig::default();
        let mut vp = viewport(&config, 10);
        vp.move_to(0.0, 0.0);
        vp.set_state(vp.offset(), 1.0, ScrollDirection::Forward);
        let plan = plan_pass(&vp, &PageOrder::identity(10), &config);

        let tiles = tiles(&plan);
        assert_eq!(tiles.len(), 12 + 7 * 3);
        assert!(tiles[12..].iter().all(|(k, _)| k.logical_page >= 1));
        assert_eq!(tiles.last().unwrap().0.logical_page, 2);
        assert_eq!(tiles.last().unwrap().1, 33);
    }

    #[test]
    fn backward_scroll_preloads_stripes_behind_first() {
        let config = EngineConfig::default();
        let mut vp = viewport(&config, 10);
        vp.set_state(Point::new(0.0, 1600.0), 1.0, ScrollDirection::Backward);
        let plan = plan_pass(&vp, &PageOrder::identity(10), &config);

        let tiles = tiles(&plan);
        assert_eq!(tiles.len(), 12 + 7 * 3 + 7 * 3);
        assert!(tiles[..12].iter().all(|(k, _)| k.logical_page == 2));
        assert_eq!(tiles[12].1, 13);

        // Stripes walk upwards from the row above the view.
        let behind: Vec<_> = tiles[12..33]
            .iter()
            .step_by(3)
            .map(|(k, _)| (k.logical_page, k.bounds.top))
            .collect();
        assert_eq!(
            behind,
            vec![
                (1, 0.75),
                (1, 0.5),
                (1, 0.25),
                (1, 0.0),
                (0, 0.75),
                (0, 0.5),
                (0, 0.25)
            ]
        );

        let ahead = &tiles[33..];
        assert_eq!((ahead[0].0.logical_page, ahead[0].0.bounds.top), (3, 0.0));
        assert!(ahead.iter().all(|(k, _)| k.logical_page >= 3));
        assert_eq!(ahead.last().unwrap().0.logical_page, 4);
        assert_eq!(ahead.last().unwrap().1, 54);
    }

    #[test]
    fn zoomed_view_skips_directional_preload() {
        let config = EngineConfig::default();
        let mut vp = viewport(&config, 10);
        vp.zoom_to(2.0);
        vp.set_state(vp.offset(), 2.0, ScrollDirection::Forward);
        let plan = plan_pass(&vp, &PageOrder::identity(10), &config);
        assert!(tiles(&plan).iter().all(|(k, _)| k.logical_page == 0));
    }

    #[test]
    fn directional_preload_needs_unit_zoom() {
        let config = EngineConfig {
            min_zoom: 0.5,
            ..EngineConfig::default()
        };
        let pages = PageOrder::identity(10);
        let mut vp = viewport(&config, 10);
        let mut count = |zoom: f32, direction: ScrollDirection| {
            vp.set_state(Point::new(0.0, 0.0), zoom, direction);
            tiles(&plan_pass(&vp, &pages, &config)).len()
        };

        // Minimum zoom below 1 is still a zoomed view.
        assert_eq!(
            count(0.5, ScrollDirection::Forward),
            count(0.5, ScrollDirection::None)
        );
        assert!(count(1.0, ScrollDirection::Forward) > count(1.0, ScrollDirection::None));
    }

    #[test]
    fn budget_caps_full_tiles() {
        let config = EngineConfig {
            cache_size: 5,
            ..EngineConfig::default()
        };
        let mut vp = viewport(&config, 10);
        vp.set_state(vp.offset(), 1.0, ScrollDirection::Forward);
        let plan = plan_pass(&vp, &PageOrder::identity(10), &config);
        assert_eq!(tiles(&plan).len(), 5);
    }

    #[test]
    fn preview_only_requests_thumbnails() {
        let config = EngineConfig {
            preview_only: true,
            ..EngineConfig::default()
        };
        let mut vp = viewport(&config, 3);
        vp.set_state(vp.offset(), 1.0, ScrollDirection::Forward);
        let plan = plan_pass(&vp, &PageOrder::identity(3), &config);
        assert!(tiles(&plan).is_empty());
        assert_eq!(thumbnails(&plan).len(), 3);
    }

    #[test]
    fn unmapped_pages_are_skipped() {
        let config = EngineConfig::default();
        let order = PageOrder::with_table(2, vec![0, 7, 1]);
        let mut vp = viewport(&config, 3);
        vp.move_to(0.0, 400.0);
        vp.set_state(vp.offset(), 1.0, ScrollDirection::None);
        let plan = plan_pass(&vp, &order, &config);

        assert!(plan.iter().all(|r| r.key().logical_page != 1));
        assert!(tiles(&plan).iter().all(|(k, _)| k.logical_page == 0));
        assert_eq!(
            thumbnails(&plan),
            vec![(0, DispatcherKind::Primary), (2, DispatcherKind::Secondary)]
        );
    }

    #[test]
    fn horizontal_layout_walks_columns() {
        let config = EngineConfig {
            orientation: crate::viewport::Orientation::Horizontal,
            ..EngineConfig::default()
        };
        let vp = viewport(&config, 4);
        let plan = plan_pass(&vp, &PageOrder::identity(4), &config);
        let tiles = tiles(&plan);

        assert_eq!(tiles.len(), 24);
        assert_eq!(tiles.iter().filter(|(k, _)| k.logical_page == 0).count(), 12);
        assert_eq!(tiles.iter().filter(|(k, _)| k.logical_page == 1).count(), 12);
    }

    #[test]
    fn empty_view_plans_nothing() {
        let config = EngineConfig::default();
        let vp = Viewport::new(&config, Size::default(), Size::new(1.0, 1.0), 3);
        assert!(plan_pass(&vp, &PageOrder::identity(3), &config).is_empty());
    }
}
