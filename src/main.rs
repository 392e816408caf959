// Copyright 2020 TwoCookingMice

#![allow(dead_code)]

use lucerna::core::scene::Scene;
use lucerna::io::{ exr_utils, png_utils };
use lucerna::math::constants::Float;
use lucerna::renderers::{ drain_final_frame, Worker };
use lucerna::scheduler::scheduler::{ DisplaySink, TaskScheduler };

use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::sync::{ Arc, Mutex };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::thread;
use std::time::Duration;

fn main() {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <output.png> [--threads N] [--width N] [--height N] [--duration SECS] [--seed N] [--hdr output.exr]", args[0]);
        std::process::exit(1);
    }

    let output_path = &args[1];
    let mut threads_override: Option<usize> = None;
    let mut width: usize = 1280;
    let mut height: usize = 720;
    let mut duration: u64 = 90;
    let mut seed: u64 = 0;
    let mut hdr_path: Option<String> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--threads" => {
                i += 1;
                threads_override = args.get(i).and_then(|v| v.parse::<usize>().ok());
            }
            "--width" => {
                i += 1;
                width = args.get(i).and_then(|v| v.parse::<usize>().ok()).unwrap_or(width);
            }
            "--height" => {
                i += 1;
                height = args.get(i).and_then(|v| v.parse::<usize>().ok()).unwrap_or(height);
            }
            "--duration" => {
                i += 1;
                duration = args.get(i).and_then(|v| v.parse::<u64>().ok()).unwrap_or(duration);
            }
            "--seed" => {
                i += 1;
                seed = args.get(i).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
            }
            "--hdr" => {
                i += 1;
                hdr_path = args.get(i).cloned();
            }
            _ => {}
        }
        i += 1;
    }

    if width == 0 || height == 0 {
        eprintln!("image dimensions must be positive");
        std::process::exit(1);
    }

    let threads = threads_override
        .filter(|&n| n >= 1)
        .unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(1));

    log::info!("Rendering {}x{} with {} workers for {} seconds.",
               width, height, threads, duration);

    let scene = Arc::new(Scene::default_scene(width as Float / height as Float));

    // The display sink just remembers the freshest frame; it is written out
    // once the render stops.
    let latest_frame: Arc<Mutex<Option<Vec<u8>>>> = Arc::new(Mutex::new(None));
    let sink_frame = latest_frame.clone();
    let display: DisplaySink = Box::new(move |frame_width, frame_height, bytes| {
        log::info!("Received a fresh {}x{} frame.", frame_width, frame_height);
        let mut guard = match sink_frame.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(bytes.to_vec());
    });

    let scheduler = Arc::new(TaskScheduler::new(threads, width, height,
                                                scene, seed, display));
    let stop = Arc::new(AtomicBool::new(false));

    let progress = ProgressBar::new(duration);
    progress.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} seconds")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    thread::scope(|scope| {
        for _ in 0..threads {
            let worker = Worker::new(scheduler.clone(), stop.clone());
            scope.spawn(move || worker.run());
        }

        for _ in 0..duration {
            thread::sleep(Duration::from_secs(1));
            progress.inc(1);
        }
        stop.store(true, Ordering::Relaxed);
    });
    progress.finish_and_clear();

    // Pump one more gather and tonemap through the pipeline so a render
    // shorter than the refresh interval still produces an image.
    drain_final_frame(&scheduler);

    let frame = {
        let mut guard = match latest_frame.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take()
    };
    match frame {
        Some(bytes) => {
            png_utils::write_png_to_file(&bytes, width as u32, height as u32, output_path);
        }
        None => log::warn!("The render produced no displayable frame."),
    }

    if let Some(path) = hdr_path {
        let (hdr_width, hdr_height, pixels) = scheduler.hdr_snapshot();
        exr_utils::write_exr_to_file(&pixels, hdr_width as u32, hdr_height as u32, &path);
    }
}
