use clap::Parser;
use client::game::LocalPlayer;
use client::input::{self, Bindings};
use client::network::ClientNetwork;
use client::raycast::{RaycastConfig, Viewport};
use client::rendering::Renderer;
use log::{error, info, warn};
use macroquad::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:5555")]
    server: String,

    /// Field of view in degrees
    #[arg(long, default_value = "80")]
    fov: f32,

    /// Number of rays cast per frame
    #[arg(long, default_value = "120")]
    num_rays: usize,

    /// Distance at which wall shading bottoms out
    #[arg(long, default_value = "500")]
    max_distance: f32,

    /// Minimap scale in pixels per tile
    #[arg(long, default_value = "4")]
    minimap_scale: f32,

    /// Window width
    #[arg(short = 'w', long, default_value = "1024")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "512")]
    height: i32,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Networked Raycaster".to_owned(),
        window_width: args.width,
        window_height: args.height,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    info!("Connecting to {}", args.server);
    let mut net = match ClientNetwork::connect(&args.server) {
        Ok(net) => net,
        Err(err) => {
            error!("Connection failed: {}", err);
            return;
        }
    };
    info!("Controls: W/S to move, A/D to turn");

    // The map arrives during the handshake; hold simulation until it lands.
    info!("Waiting for map...");
    let map = loop {
        if let Some(map) = net.map() {
            break map;
        }
        if !net.is_running() {
            error!("Session closed before the map arrived");
            return;
        }
        next_frame().await;
    };
    info!("Received {}x{} map", map.map_x, map.map_y);

    let bindings = Bindings::default();
    let mut player = LocalPlayer::at_spawn(&map);
    let renderer = Renderer::new(
        Viewport {
            width: screen_width(),
            height: screen_height(),
        },
        RaycastConfig {
            fov: args.fov,
            num_rays: args.num_rays,
            max_distance: args.max_distance,
        },
        args.minimap_scale,
    );

    while net.is_running() {
        let dt = get_frame_time();
        player.advance(&map, input::held_actions(&bindings), dt);
        net.send_pose(player.pose());

        let (my_id, world) = net.view();
        renderer.draw_frame(&map, &player.pose(), &world, my_id);

        next_frame().await;
    }

    warn!("Session over, exiting");
    net.close();
}
