// Copyright (c) 2024 Linaro LTD
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use osal::clock;
use osal::error::{Error, EINVAL};
use osal::timer::{TimerConfig, TimerTask};
use rand::Rng;
use rand_pcg::Pcg32;

use common::{boot, eventually};

fn sleep_ms(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}

/// A callback counting its calls.
fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    (count, move || {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn one_shot_fires_once() {
    boot();
    let (count, callback) = counter();
    let config = TimerConfig::new("once", 100).one_shot(true);
    let timer = TimerTask::new(&config, 0, callback).unwrap();

    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));
    sleep_ms(300);
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(!timer.is_active());
    timer.delete().unwrap();
}

#[test]
fn periodic_expiries_keep_step() {
    boot();
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let start = clock::now_ms().unwrap();
    let timer = {
        let stamps = stamps.clone();
        TimerTask::new(&TimerConfig::new("steady", 50), 20, move || {
            if let Ok(now) = clock::now_ms() {
                stamps.lock().unwrap().push(now);
            }
        })
        .unwrap()
    };
    assert!(timer.is_active());
    assert_eq!(timer.period(), osal::time::ms_duration(50));

    sleep_ms(300);
    timer.delete().unwrap();

    let stamps = stamps.lock().unwrap();
    assert!(stamps.len() >= 4, "only {} expiries", stamps.len());
    assert!(stamps.len() <= 7, "{} expiries", stamps.len());
    assert!(stamps[0].wrapping_sub(start) >= 19, "first expiry at {:?}", stamps[0]);
    for pair in stamps.windows(2) {
        let step = pair[1] - pair[0];
        assert!((30..=90).contains(&step), "expiries {} ms apart", step);
    }
}

#[test]
fn start_later_stays_dormant() {
    boot();
    let (count, callback) = counter();
    let config = TimerConfig::new("sleepy", 20).start_later(true);
    let mut timer = TimerTask::new(&config, 0, callback).unwrap();

    sleep_ms(100);
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(!timer.is_active());

    timer.start().unwrap();
    assert!(eventually(|| count.load(Ordering::SeqCst) >= 2));

    timer.stop().unwrap();
    assert!(!timer.is_active());
    // A callback already running still finishes.
    sleep_ms(20);
    let stopped = count.load(Ordering::SeqCst);
    sleep_ms(100);
    assert_eq!(count.load(Ordering::SeqCst), stopped);
}

#[test]
fn restart_counts_a_full_period() {
    boot();
    let (count, callback) = counter();
    let config = TimerConfig::new("restarted", 150).one_shot(true);
    let mut timer = TimerTask::new(&config, 100, callback).unwrap();

    // Push the expiry back, twice.
    sleep_ms(60);
    timer.restart().unwrap();
    sleep_ms(60);
    timer.restart().unwrap();
    sleep_ms(60);
    assert_eq!(count.load(Ordering::SeqCst), 0);

    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));
    assert!(!timer.is_active());

    // A dormant timer is started by a restart.
    timer.restart().unwrap();
    assert!(timer.is_active());
    assert!(eventually(|| count.load(Ordering::SeqCst) == 2));
}

#[test]
fn zero_period_is_rejected() {
    boot();
    let config = TimerConfig::new("never", 0);
    assert_eq!(TimerTask::new(&config, 0, || ()).unwrap_err(), Error(EINVAL));
}

#[test]
fn stopped_callbacks_stay_quiet() {
    boot();
    let (count, callback) = counter();
    let mut timer = TimerTask::new(&TimerConfig::new("quiet", 10), 0, callback).unwrap();
    assert!(eventually(|| count.load(Ordering::SeqCst) >= 3));
    timer.stop().unwrap();
    sleep_ms(20);
    let stopped = count.load(Ordering::SeqCst);
    sleep_ms(60);
    assert_eq!(count.load(Ordering::SeqCst), stopped);
    drop(timer);
}

#[test]
fn random_periods() {
    boot();
    const RUN_MS: u32 = 500;

    let mut rng = Pcg32::new(1, 1);
    let timers: Vec<_> = (0..5)
        .map(|i| {
            let period = rng.gen_range(20..80);
            let (count, callback) = counter();
            let name = format!("random{}", i);
            let timer = TimerTask::new(&TimerConfig::new(&name, period), period, callback)
                .unwrap();
            (period, count, timer)
        })
        .collect();

    sleep_ms(u64::from(RUN_MS));

    for (period, count, timer) in timers {
        timer.delete().unwrap();
        let count = count.load(Ordering::SeqCst) as u32;
        let expected = RUN_MS / period;
        assert!(
            count + 2 >= expected && count <= expected + 2,
            "period {}: {} expiries, expected about {}",
            period,
            count,
            expected,
        );
    }
}

#[test]
fn panicking_callback_spares_the_others() {
    boot();
    let config = TimerConfig::new("faulty", 10).one_shot(true);
    let faulty = TimerTask::new(&config, 0, || panic!("timer callback failure")).unwrap();
    sleep_ms(50);

    let (count, callback) = counter();
    let config = TimerConfig::new("healthy", 10).one_shot(true);
    let healthy = TimerTask::new(&config, 0, callback).unwrap();
    assert!(eventually(|| count.load(Ordering::SeqCst) == 1));

    faulty.delete().unwrap();
    healthy.delete().unwrap();
}
