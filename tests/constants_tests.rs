// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use camera_session::constants::pipeline;
use camera_session::{RotateMethod, WhiteBalanceMode};

#[test]
fn test_white_balance_index_encoding() {
    assert_eq!(WhiteBalanceMode::ALL.len(), 9);
    for (i, mode) in WhiteBalanceMode::ALL.iter().enumerate() {
        assert_eq!(mode.index(), i as i32);
        assert_eq!(WhiteBalanceMode::from_index(i as i32), Some(*mode));
    }
    assert_eq!(WhiteBalanceMode::from_index(-1), None);
    assert_eq!(WhiteBalanceMode::from_index(9), None);
}

#[test]
fn test_white_balance_names() {
    assert_eq!(
        WhiteBalanceMode::from_name("cloudy-daylight"),
        WhiteBalanceMode::CloudyDaylight
    );
    // Unknown names fall back to auto
    assert_eq!(WhiteBalanceMode::from_name("neon"), WhiteBalanceMode::Auto);
}

#[test]
fn test_rotate_method_encoding() {
    assert_eq!(RotateMethod::from_index(0), Some(RotateMethod::Identity));
    assert_eq!(RotateMethod::from_index(1), Some(RotateMethod::Clockwise));
    assert_eq!(RotateMethod::from_index(8), Some(RotateMethod::Automatic));
    assert_eq!(RotateMethod::from_index(9), None);
    assert_eq!(RotateMethod::Counterclockwise.nick(), "90l");
}

#[test]
fn test_stage_names_are_distinct() {
    let names = [
        pipeline::SOURCE_NAME,
        pipeline::FILTER_NAME,
        pipeline::SINK_NAME,
        pipeline::PIPELINE_NAME,
    ];
    for (i, a) in names.iter().enumerate() {
        for b in &names[i + 1..] {
            assert_ne!(a, b);
        }
    }
}
