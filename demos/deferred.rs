//! Deferred shading frame loop against the headless device: a geometry pass
//! fills the GBuffer, a lighting pass resolves it into an HDR target, and a
//! tonemap pass writes the imported backbuffer. Material data lives in a
//! device-local GPU table fed through the staging upload path.
//!
//! Run with `RUST_LOG=trace cargo run --example deferred` to watch the graph
//! schedule, realize and barrier each frame.

use anyhow::Result;
use ash::vk;
use slotmap::new_key_type;

use framegraph::device::{AccessPolicy, GraphicsDevice, TextureDesc, TextureViewDesc, ViewType};
use framegraph::table::GpuTableDeviceLocal;
use framegraph::upload::UploadContext;
use framegraph::{GarbageBin, NullDevice, RenderGraph, ResourceRegistry, ResourceState};

const FRAMES_IN_FLIGHT: usize = 2;

new_key_type! { struct MaterialHandle; }

#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct Material {
    albedo: [f32; 4],
    roughness: f32,
    metallic: f32,
    _pad: [f32; 2],
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    let mut device = NullDevice::new();
    let mut registry = ResourceRegistry::new();
    let mut bin = GarbageBin::new(FRAMES_IN_FLIGHT);
    let mut upload = UploadContext::new(&mut device, 1 << 16);
    let mut graph = RenderGraph::new();

    let mut materials: GpuTableDeviceLocal<MaterialHandle> =
        GpuTableDeviceLocal::new(&mut device, "materials", 32, 256);
    let gold = materials.allocate_pod(&Material {
        albedo: [1.0, 0.77, 0.34, 1.0],
        roughness: 0.2,
        metallic: 1.0,
        _pad: [0.0; 2],
    });

    let backbuffer = device.create_texture(
        TextureDesc::default()
            .format(vk::Format::B8G8R8A8_UNORM)
            .extent(1280, 720)
            .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .debug_name("backbuffer"),
    );
    registry.import_texture(
        "backbuffer",
        backbuffer,
        ResourceState::UNDEFINED,
        ResourceState::PRESENT,
    );

    for frame in 0..3 {
        bin.begin_frame(&mut device);
        log::info!("frame {frame}");

        // Roughen the material a little every frame; the old table range
        // stays readable until in-flight frames retire.
        materials.request_update_pod(
            gold,
            &mut bin,
            &Material {
                albedo: [1.0, 0.77, 0.34, 1.0],
                roughness: 0.2 + frame as f32 * 0.1,
                metallic: 1.0,
                _pad: [0.0; 2],
            },
        );
        materials.flush_uploads(&mut device, &mut upload);
        upload.submit_copies(&mut device)?;

        let material_table = materials.global_descriptor();
        let material_index = materials.local_offset(gold);

        graph.add_pass(
            &mut registry,
            "geometry",
            |builder| {
                builder.declare_texture(
                    "gbuffer",
                    TextureDesc::default()
                        .format(vk::Format::R16G16B16A16_SFLOAT)
                        .extent(1280, 720)
                        .usage(
                            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                        )
                        .debug_name("gbuffer"),
                );
                builder.declare_texture(
                    "depth",
                    TextureDesc::default()
                        .format(vk::Format::D32_SFLOAT)
                        .extent(1280, 720)
                        .usage(
                            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                                | vk::ImageUsageFlags::SAMPLED,
                        )
                        .debug_name("depth"),
                );
                builder.write_render_target(
                    "gbuffer",
                    AccessPolicy::ClearPreserve,
                    TextureViewDesc::new(ViewType::RenderTarget, vk::Format::R16G16B16A16_SFLOAT),
                );
                builder.write_depth_stencil(
                    "depth",
                    AccessPolicy::ClearPreserve,
                    AccessPolicy::DiscardDiscard,
                    TextureViewDesc::new(ViewType::DepthStencil, vk::Format::D32_SFLOAT),
                );
            },
            move |_, _, _, _: &()| {
                log::debug!("geometry: drawing with material table {material_table} index {material_index}");
            },
        );

        graph.add_pass(
            &mut registry,
            "light",
            |builder| {
                builder.declare_texture(
                    "hdr",
                    TextureDesc::default()
                        .format(vk::Format::R16G16B16A16_SFLOAT)
                        .extent(1280, 720)
                        .usage(
                            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                        )
                        .debug_name("hdr"),
                );
                builder.read_texture(
                    "gbuffer",
                    ResourceState::PIXEL_SHADER_RESOURCE,
                    TextureViewDesc::new(ViewType::ShaderResource, vk::Format::R16G16B16A16_SFLOAT),
                );
                builder.read_depth_stencil(
                    "depth",
                    TextureViewDesc::new(ViewType::DepthStencil, vk::Format::D32_SFLOAT),
                );
                builder.write_render_target(
                    "hdr",
                    AccessPolicy::ClearPreserve,
                    TextureViewDesc::new(ViewType::RenderTarget, vk::Format::R16G16B16A16_SFLOAT),
                );
            },
            |_, _, resources, _: &()| {
                log::debug!("light: sampling gbuffer at descriptor {}", resources.descriptor("gbuffer"));
            },
        );

        graph.add_pass(
            &mut registry,
            "tonemap",
            |builder| {
                builder.read_texture(
                    "hdr",
                    ResourceState::PIXEL_SHADER_RESOURCE,
                    TextureViewDesc::new(ViewType::ShaderResource, vk::Format::R16G16B16A16_SFLOAT),
                );
                builder.write_render_target(
                    "backbuffer",
                    AccessPolicy::ClearPreserve,
                    TextureViewDesc::new(ViewType::RenderTarget, vk::Format::B8G8R8A8_UNORM),
                );
            },
            |_, _, resources, _: &()| {
                log::debug!("tonemap: resolving hdr at descriptor {}", resources.descriptor("hdr"));
            },
        );

        graph.build(&mut registry, &mut device);
        graph.execute(&mut registry, &mut bin, &mut device)?;
        graph.clear(&mut bin);
        registry.tick(&mut bin);

        bin.end_frame();
    }

    device.wait_idle();
    materials.free(gold, &mut bin);
    materials.retire(&mut bin);
    upload.destroy(&mut device);
    bin.force_clear(&mut device);
    device.destroy_texture(backbuffer);

    log::info!(
        "shutdown: {} buffers, {} textures, {} views still alive",
        device.live_buffer_count(),
        device.live_texture_count(),
        device.live_view_count()
    );
    Ok(())
}
