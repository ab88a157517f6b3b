//! Desktop window for annotated composites.
//!
//! macroquad owns the thread that opens the window, so `run_window` is called from `main` and
//! the relay keeps running on its own threads. Q or Escape closes the window; the relay stays
//! up until it is stopped separately.

use image::{DynamicImage, RgbImage};
use macroquad::prelude::{
    clear_background, draw_texture_ex, is_key_pressed, next_frame, screen_height, screen_width,
    vec2, Conf, DrawTextureParams, FilterMode, KeyCode, Texture2D, BLACK, WHITE,
};

use crate::display::{FeedState, WindowFeed};

const WINDOW_WIDTH: i32 = 960;
const WINDOW_HEIGHT: i32 = 480;

/// Show composites from `feed` until the quit key is pressed or the feed closes.
pub fn run_window(feed: WindowFeed, title: &str) {
    let conf = Conf {
        window_title: title.to_string(),
        window_width: WINDOW_WIDTH,
        window_height: WINDOW_HEIGHT,
        ..Default::default()
    };
    macroquad::Window::from_config(conf, async move {
        let mut texture: Option<Texture2D> = None;
        loop {
            if is_key_pressed(KeyCode::Q) || is_key_pressed(KeyCode::Escape) {
                log::info!("quit key pressed, closing display window");
                feed.close();
                break;
            }
            match feed.poll() {
                FeedState::Frame(frame) => texture = Some(to_texture(&frame)),
                FeedState::Idle => {}
                FeedState::Closed => break,
            }

            clear_background(BLACK);
            if let Some(texture) = &texture {
                draw_texture_ex(
                    texture,
                    0.0,
                    0.0,
                    WHITE,
                    DrawTextureParams {
                        dest_size: Some(vec2(screen_width(), screen_height())),
                        ..Default::default()
                    },
                );
            }
            next_frame().await;
        }
    });
    log::info!("display window closed");
}

fn to_texture(frame: &RgbImage) -> Texture2D {
    let rgba = DynamicImage::ImageRgb8(frame.clone()).into_rgba8();
    let texture = Texture2D::from_rgba8(frame.width() as u16, frame.height() as u16, rgba.as_raw());
    texture.set_filter(FilterMode::Linear);
    texture
}
