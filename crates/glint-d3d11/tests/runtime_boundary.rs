//! Opaque-handle boundary surface: handle stability, create/release pairing,
//! sentinel queries, format-hint mapping.

use glint_d3d11::{
    D3dError, ResourceKind, Runtime, FORMAT_HINT_BYTE_ALPHA, FORMAT_HINT_BYTE_GRAY,
    FORMAT_HINT_BYTE_RGB, FORMAT_HINT_BYTE_RGBA_PRE, FORMAT_HINT_FLOAT_XYZW,
    FORMAT_HINT_INT_ARGB_PRE, FORMAT_HINT_NONE, USAGE_HINT_DEFAULT, USAGE_HINT_DYNAMIC,
};
use glint_gpu::{FeatureLevel, PixelFormat, SoftFactory};
use pretty_assertions::assert_eq;

fn runtime() -> Runtime<SoftFactory> {
    Runtime::init(SoftFactory::new(1)).expect("runtime")
}

fn plain_texture(rt: &mut Runtime<SoftFactory>, ctx: u64, width: u32, height: u32) -> u64 {
    rt.create_texture(
        ctx,
        FORMAT_HINT_NONE,
        USAGE_HINT_DEFAULT,
        false,
        false,
        width,
        height,
        0,
        false,
    )
    .expect("texture")
}

#[test]
fn same_ordinal_yields_identical_context_handle() {
    let mut rt = runtime();
    let first = rt.get_context(0).expect("context");
    let second = rt.get_context(0).expect("context");
    assert_eq!(first, second);
    assert!(first != 0, "zero is reserved as the caller's null");
}

#[test]
fn create_release_roundtrip_and_stale_handle() {
    let mut rt = runtime();
    let ctx = rt.get_context(0).expect("context");
    let tex = plain_texture(&mut rt, ctx, 64, 32);

    assert_eq!(rt.texture_width(tex), 64);
    assert_eq!(rt.texture_height(tex), 32);

    rt.release_resource(ctx, tex).expect("release");
    assert_eq!(
        rt.release_resource(ctx, tex),
        Err(D3dError::UnknownHandle)
    );
    assert_eq!(rt.texture_width(tex), -1);
    assert_eq!(rt.texture_height(tex), -1);
}

#[test]
fn resources_are_bound_to_their_context() {
    let mut rt = Runtime::init(SoftFactory::new(2)).expect("runtime");
    let ctx0 = rt.get_context(0).expect("context 0");
    let ctx1 = rt.get_context(1).expect("context 1");
    let tex = plain_texture(&mut rt, ctx0, 8, 8);

    assert_eq!(rt.release_resource(ctx1, tex), Err(D3dError::WrongContext));
    // Still releasable through its owner.
    rt.release_resource(ctx0, tex).expect("release");
}

#[test]
fn unknown_context_handle_is_rejected() {
    let mut rt = runtime();
    assert_eq!(
        rt.create_pixel_shader(42, b"ps").err(),
        Some(D3dError::UnknownContext)
    );
}

#[test]
fn max_texture_size_follows_the_feature_level_table() {
    let mut rt = runtime();
    let ctx = rt.get_context(0).expect("context");
    assert_eq!(rt.max_texture_size(ctx), 16384);

    let mut factory = SoftFactory::new(1);
    factory.set_supported_feature_level(FeatureLevel::L9_3);
    let mut rt93 = Runtime::init(factory).expect("runtime");
    let ctx93 = rt93.get_context(0).expect("context");
    // The capability table has no entry below level 10.
    assert_eq!(rt93.max_texture_size(ctx93), -1);

    assert_eq!(rt.max_texture_size(999), -1);
}

#[test]
fn max_sample_support_reports_zero_without_a_context() {
    let mut factory = SoftFactory::new(2);
    factory.fail_device_creation(1);
    let mut rt = Runtime::init(factory).expect("runtime");
    assert!(rt.max_sample_support(0) >= 1);
    assert_eq!(rt.max_sample_support(1), 0);
}

#[test]
fn constant_upload_bounds_are_checked_before_the_device() {
    let mut rt = runtime();
    let ctx = rt.get_context(0).expect("context");
    let created_before = rt
        .pipeline()
        .created_context(0)
        .expect("created")
        .device()
        .buffers_created();

    let data = [0.0f32; 16];
    assert_eq!(
        rt.set_constants_f(ctx, 0, &data, 10, 7),
        Err(D3dError::OutOfBounds {
            offset: 10,
            count: 7,
            len: 16
        })
    );
    let ints = [0i32; 4];
    assert_eq!(
        rt.set_constants_i(ctx, 0, &ints, usize::MAX, 2),
        Err(D3dError::OutOfBounds {
            offset: usize::MAX,
            count: 2,
            len: 4
        })
    );

    let created_after = rt
        .pipeline()
        .created_context(0)
        .expect("created")
        .device()
        .buffers_created();
    assert_eq!(created_after, created_before);

    rt.set_constants_f(ctx, 0, &data, 8, 8).expect("in range");
}

#[test]
fn format_hints_map_to_native_formats() {
    let mut rt = runtime();
    let ctx = rt.get_context(0).expect("context");

    let cases = [
        (FORMAT_HINT_BYTE_RGBA_PRE, false, PixelFormat::B8G8R8A8Unorm),
        (FORMAT_HINT_INT_ARGB_PRE, false, PixelFormat::B8G8R8A8Unorm),
        (FORMAT_HINT_BYTE_RGB, false, PixelFormat::B8G8R8X8Unorm),
        (FORMAT_HINT_BYTE_GRAY, false, PixelFormat::R8Unorm),
        (FORMAT_HINT_BYTE_ALPHA, false, PixelFormat::A8Unorm),
        (FORMAT_HINT_FLOAT_XYZW, false, PixelFormat::R32G32B32A32Float),
        // Unpinned: opaque defaults to no-alpha, otherwise premultiplied.
        (FORMAT_HINT_NONE, true, PixelFormat::B8G8R8X8Unorm),
        (FORMAT_HINT_NONE, false, PixelFormat::B8G8R8A8Unorm),
        // Unknown hints leave the format unpinned.
        (77, true, PixelFormat::B8G8R8X8Unorm),
    ];
    for (hint, is_opaque, expected) in cases {
        let tex = rt
            .create_texture(ctx, hint, USAGE_HINT_DEFAULT, false, is_opaque, 4, 4, 0, false)
            .expect("texture");
        match rt.resource_kind(tex) {
            Some(ResourceKind::Texture { format, .. }) => assert_eq!(*format, expected),
            other => panic!("expected texture record, got {other:?}"),
        }
    }
}

#[test]
fn multisampled_textures_become_render_targets() {
    let mut rt = runtime();
    let ctx = rt.get_context(0).expect("context");
    let tex = rt
        .create_texture(ctx, FORMAT_HINT_NONE, USAGE_HINT_DEFAULT, false, true, 32, 32, 4, false)
        .expect("texture");
    match rt.resource_kind(tex) {
        Some(ResourceKind::Texture { render_target, .. }) => assert!(render_target.is_some()),
        other => panic!("expected texture record, got {other:?}"),
    }
}

#[test]
fn swap_chain_present_roundtrip() {
    let mut rt = runtime();
    let ctx = rt.get_context(0).expect("context");
    let swap = rt.create_swap_chain(ctx, 0xabcd, true).expect("swap chain");

    rt.present(ctx, swap).expect("present");
    rt.present(ctx, swap).expect("present");
    assert_eq!(
        rt.pipeline()
            .created_context(0)
            .expect("created")
            .device()
            .presents(),
        2
    );

    rt.release_resource(ctx, swap).expect("release");
    assert_eq!(rt.present(ctx, swap), Err(D3dError::UnknownHandle));
}

#[test]
fn default_pool_release_prunes_boundary_handles() {
    let mut rt = runtime();
    let ctx = rt.get_context(0).expect("context");
    let swap = rt.create_swap_chain(ctx, 1, false).expect("swap chain");
    let dynamic = rt
        .create_texture(ctx, FORMAT_HINT_NONE, USAGE_HINT_DYNAMIC, false, false, 8, 8, 0, false)
        .expect("texture");
    let shader = rt.create_pixel_shader(ctx, b"ps").expect("shader");

    rt.release_default_pool_resources(ctx).expect("release pool");

    assert!(rt.resource_kind(swap).is_none());
    assert!(rt.resource_kind(dynamic).is_some());
    assert!(rt.resource_kind(shader).is_some());
    // The pruned handle is now stale at every surface.
    assert_eq!(rt.release_resource(ctx, swap), Err(D3dError::UnknownHandle));
}

#[test]
fn adapter_count_and_monitor_lookup_pass_through() {
    let mut factory = SoftFactory::new(2);
    factory.fail_device_creation(1);
    let mut rt = Runtime::init(factory).expect("runtime");

    assert_eq!(rt.adapter_count(), 2);
    assert_eq!(rt.adapter_ordinal_by_monitor(0x1000), Some(0));
    assert_eq!(rt.adapter_ordinal_by_monitor(0x1001), Some(1));
    assert_eq!(rt.adapter_ordinal_by_monitor(7), None);

    // A failed adapter does not change the table shape.
    assert!(rt.get_context(1).is_err());
    assert_eq!(rt.adapter_count(), 2);
}
