use approx::assert_abs_diff_eq;
use rand::{Rng, SeedableRng};
use sparseflow_image::{Image, ImageSize};
use sparseflow_imgproc::parallel::ExecutionStrategy;
use sparseflow_tracking::{ErrorMetric, LkParams, PyrLkTracker, TrackStatus, TrackingError};

fn texture(x: f32, y: f32) -> u8 {
    let v = 128.0 + 50.0 * (0.15 * x + 0.08 * y).sin() + 50.0 * (0.11 * y - 0.07 * x).cos();
    v.round().clamp(0.0, 255.0) as u8
}

// The texture with its content moved by (dx, dy).
fn shifted_texture(size: ImageSize, dx: i32, dy: i32) -> Image<u8, 1> {
    let data = (0..size.height)
        .flat_map(|y| {
            (0..size.width).map(move |x| texture((x as i32 - dx) as f32, (y as i32 - dy) as f32))
        })
        .collect();
    Image::new(size, data).unwrap()
}

#[test]
fn track_translation() -> Result<(), TrackingError> {
    let size = ImageSize {
        width: 160,
        height: 120,
    };
    let prev = shifted_texture(size, 0, 0);
    let points = [[80.0, 60.0], [60.5, 50.25], [100.0, 70.0]];

    for (dx, dy) in [(3, -2), (-4, 1), (0, 5)] {
        let next = shifted_texture(size, dx, dy);
        let tracker = PyrLkTracker::new(LkParams::default())?;
        let tracked = tracker.track_images(&prev, &next, &points, None)?;

        assert_eq!(tracked.len(), points.len());
        for (p, t) in points.iter().zip(tracked.iter()) {
            assert_eq!(t.status, TrackStatus::Tracked);
            assert_abs_diff_eq!(t.position[0], p[0] + dx as f32, epsilon = 0.1);
            assert_abs_diff_eq!(t.position[1], p[1] + dy as f32, epsilon = 0.1);
            assert!(t.error.is_some_and(|e| e < 1.0), "{t:?}");
        }
    }
    Ok(())
}

#[test]
fn track_with_initial_guess() -> Result<(), TrackingError> {
    let size = ImageSize {
        width: 160,
        height: 120,
    };
    let prev = shifted_texture(size, 0, 0);
    let next = shifted_texture(size, 2, 2);
    let tracker = PyrLkTracker::new(LkParams::default())?;

    let tracked = tracker.track_images(&prev, &next, &[[80.0, 60.0]], Some(&[[81.5, 61.5]]))?;
    assert_eq!(tracked[0].status, TrackStatus::Tracked);
    assert_abs_diff_eq!(tracked[0].position[0], 82.0, epsilon = 0.1);
    assert_abs_diff_eq!(tracked[0].position[1], 62.0, epsilon = 0.1);
    Ok(())
}

#[test]
fn track_is_independent_of_strategy() -> Result<(), TrackingError> {
    let size = ImageSize {
        width: 128,
        height: 96,
    };
    let prev = shifted_texture(size, 0, 0);
    let next = shifted_texture(size, 1, -1);
    let mut rng = rand::rngs::StdRng::seed_from_u64(11);
    let points: Vec<[f32; 2]> = (0..200)
        .map(|_| [rng.random_range(0.0..128.0), rng.random_range(0.0..96.0)])
        .collect();

    let serial = PyrLkTracker::new(LkParams::default())?
        .with_strategy(ExecutionStrategy::Serial)
        .track_images(&prev, &next, &points, None)?;
    let parallel = PyrLkTracker::new(LkParams::default())?
        .with_strategy(ExecutionStrategy::Fixed(4))
        .track_images(&prev, &next, &points, None)?;

    assert_eq!(serial, parallel);
    Ok(())
}

#[test]
fn flat_region_is_lost() -> Result<(), TrackingError> {
    let image = Image::<u8, 1>::from_size_val([100, 100].into(), 100)?;
    let tracker = PyrLkTracker::new(LkParams {
        error_metric: ErrorMetric::MinEigenvalue,
        ..Default::default()
    })?;

    let tracked = tracker.track_images(&image, &image, &[[50.0, 50.0]], None)?;
    assert_eq!(tracked[0].status, TrackStatus::Lost);
    assert_eq!(tracked[0].error, Some(0.0));
    Ok(())
}

#[test]
fn out_of_bounds_seed_is_lost() -> Result<(), TrackingError> {
    let size = ImageSize {
        width: 160,
        height: 120,
    };
    let prev = shifted_texture(size, 0, 0);
    let tracker = PyrLkTracker::new(LkParams::default())?;

    let tracked = tracker.track_images(&prev, &prev, &[[-200.0, -200.0]], None)?;
    assert_eq!(tracked[0].status, TrackStatus::Lost);
    assert_eq!(tracked[0].position, [-200.0, -200.0]);
    assert_eq!(tracked[0].error, Some(0.0));
    Ok(())
}

#[test]
fn lost_at_level_zero_keeps_seed() -> Result<(), TrackingError> {
    let size = ImageSize {
        width: 160,
        height: 120,
    };
    let prev = shifted_texture(size, 0, 0);
    let next = shifted_texture(size, 3, 2);
    let tracker = PyrLkTracker::new(LkParams::default())?;

    // inside the image at level 1, outside at level 0
    let seeds = [[-15.0, 60.0], [-12.0, 60.0]];
    let tracked = tracker.track_images(&prev, &next, &seeds, None)?;
    for (seed, t) in seeds.iter().zip(tracked.iter()) {
        assert_eq!(t.status, TrackStatus::Lost);
        assert_eq!(t.position, *seed);
    }

    // with initial flow the guess is the seed
    let tracked = tracker.track_images(&prev, &next, &[[-15.0, 60.0]], Some(&[[-14.0, 61.0]]))?;
    assert_eq!(tracked[0].status, TrackStatus::Lost);
    assert_eq!(tracked[0].position, [-14.0, 61.0]);
    Ok(())
}

// 2x2 blocks aligned with the 2x2 box decimation: level 1 becomes a one pixel
// checkerboard without gradients and level 2 is flat.
fn fine_checkerboard(size: ImageSize) -> Image<u8, 1> {
    let data = (0..size.height)
        .flat_map(|y| {
            (0..size.width).map(move |x| if ((x + 1) / 2 + (y + 1) / 2) % 2 == 0 { 255 } else { 0 })
        })
        .collect();
    Image::new(size, data).unwrap()
}

#[test]
fn flat_coarse_levels_do_not_lose_points() -> Result<(), TrackingError> {
    let image = fine_checkerboard([128, 128].into());
    let tracker = PyrLkTracker::new(LkParams::default())?;
    let pyramid = tracker.build_pyramid(&image, true)?;
    assert_eq!(pyramid.max_level(), 2);

    let coarse = pyramid.level(1).and_then(|l| l.gradient.as_ref()).unwrap();
    for y in 21..=43 {
        for x in 21..=43 {
            assert_eq!(coarse.get(x, y, 0), Some(&0));
            assert_eq!(coarse.get(x, y, 1), Some(&0));
        }
    }
    let fine = pyramid.level(0).and_then(|l| l.gradient.as_ref()).unwrap();
    assert_ne!(fine.get(64, 64, 0), Some(&0));

    let next = tracker.build_pyramid(&image, false)?;
    let tracked = tracker.track(&pyramid, &next, &[[64.0, 64.0]], None)?;
    assert_eq!(tracked[0].status, TrackStatus::Tracked);
    assert_abs_diff_eq!(tracked[0].position[0], 64.0, epsilon = 1e-3);
    assert_abs_diff_eq!(tracked[0].position[1], 64.0, epsilon = 1e-3);
    assert_eq!(tracked[0].error, Some(0.0));

    // a frame flat at level 0 too is lost
    let flat = Image::<u8, 1>::from_size_val([128, 128].into(), 128)?;
    let tracked = tracker.track_images(&flat, &flat, &[[64.0, 64.0]], None)?;
    assert_eq!(tracked[0].status, TrackStatus::Lost);
    Ok(())
}

#[test]
fn empty_points() -> Result<(), TrackingError> {
    let image = shifted_texture([64, 64].into(), 0, 0);
    let tracker = PyrLkTracker::new(LkParams::default())?;
    assert!(tracker.track_images(&image, &image, &[], None)?.is_empty());
    Ok(())
}

#[test]
fn mismatched_inputs() -> Result<(), TrackingError> {
    let tracker = PyrLkTracker::new(LkParams::default())?;
    let a = tracker.build_pyramid(&shifted_texture([128, 128].into(), 0, 0), true)?;
    let b = tracker.build_pyramid(&shifted_texture([64, 64].into(), 0, 0), false)?;
    let c = tracker.build_pyramid(&shifted_texture([128, 100].into(), 0, 0), false)?;

    assert_eq!(
        tracker.track(&a, &b, &[[1.0, 1.0]], None),
        Err(TrackingError::LevelCountMismatch(a.len(), b.len()))
    );
    assert!(matches!(
        tracker.track(&a, &c, &[[1.0, 1.0]], None),
        Err(TrackingError::LevelSizeMismatch { level: 0, .. })
    ));
    assert_eq!(
        tracker.track(&a, &a, &[[1.0, 1.0]], Some(&[])),
        Err(TrackingError::PointCountMismatch(0, 1))
    );
    Ok(())
}
