//! Case tables: which descriptors live in which set, which copies are
//! recorded and which dynamic areas the shader reads.

use cts_core::CtsError;

use super::model::{DescriptorCommands, DescriptorKind, PipelineType};

type Built = Result<DescriptorCommands, CtsError>;

/// Kinds that get the generic `_0` .. `_array2` table, with their group
/// prefix. Input attachments only exist in fragment shaders.
pub fn generic_kinds(pipeline: PipelineType) -> Vec<(&'static str, DescriptorKind)> {
    let mut kinds = vec![
        ("uniform_buffer", DescriptorKind::UniformBuffer),
        ("inline_uniform_block", DescriptorKind::InlineUniformBlock),
        ("storage_buffer", DescriptorKind::StorageBuffer),
        ("combined_image_sampler", DescriptorKind::CombinedImageSampler),
        ("storage_image", DescriptorKind::StorageImage),
    ];
    if pipeline == PipelineType::Graphics {
        kinds.push(("input_attachment", DescriptorKind::InputAttachment));
    }
    kinds.extend([
        ("uniform_texel_buffer", DescriptorKind::UniformTexelBuffer),
        ("storage_texel_buffer", DescriptorKind::StorageTexelBuffer),
        ("uniform_buffer_dynamic", DescriptorKind::UniformBufferDynamic),
        ("storage_buffer_dynamic", DescriptorKind::StorageBufferDynamic),
    ]);
    kinds
}

/// (array_size, write_start, elements_to_write, dynamic areas) per binding.
type BindingShape = (u32, u32, u32, u32);

fn add_all(c: &mut DescriptorCommands, kind: DescriptorKind, bindings: &[(u32, BindingShape)]) {
    for &(set, (size, start, count, areas)) in bindings {
        let d = c.descriptor(kind, size, start, count, areas);
        c.add_descriptor(d, set);
    }
}

fn finish(mut c: DescriptorCommands, dynamic_areas: &[u32]) -> DescriptorCommands {
    c.set_dynamic_areas(dynamic_areas.to_vec());
    c.add_result_buffer();
    c
}

fn repeated_copies(c: &mut DescriptorCommands) -> Result<(), CtsError> {
    for _ in 0..100 {
        c.copy_single(0, 0, 1, 0)?;
    }
    c.copy_single(1, 1, 0, 0)?;
    for _ in 0..100 {
        c.copy_single(1, 0, 1, 1)?;
    }
    Ok(())
}

/// The generic table for one descriptor kind, as `(suffix, commands)`.
pub fn generic_cases(kind: DescriptorKind, pipeline: PipelineType) -> Vec<(&'static str, Built)> {
    vec![
        // Copy inside the same set.
        ("_0", {
            let mut c = DescriptorCommands::new(pipeline);
            add_all(&mut c, kind, &[(0, (1, 0, 1, 3)), (0, (1, 0, 1, 2))]);
            c.copy_single(0, 0, 0, 1).map(|_| finish(c, &[2, 1]))
        }),
        // Copy between sets.
        ("_1", {
            let mut c = DescriptorCommands::new(pipeline);
            add_all(&mut c, kind, &[(0, (1, 0, 1, 2)), (1, (1, 0, 1, 4))]);
            c.copy_single(0, 0, 1, 0).map(|_| finish(c, &[0, 1]))
        }),
        // Destination never written by the host.
        ("_2", {
            let mut c = DescriptorCommands::new(pipeline);
            add_all(&mut c, kind, &[(0, (1, 0, 1, 2)), (1, (1, 0, 0, 1))]);
            c.copy_single(0, 0, 1, 0).map(|_| finish(c, &[1, 0]))
        }),
        // Five sets, several copies.
        ("_3", {
            let mut c = DescriptorCommands::new(pipeline);
            add_all(
                &mut c,
                kind,
                &[
                    (0, (1, 0, 1, 3)),
                    (0, (1, 0, 1, 4)),
                    (1, (1, 0, 1, 2)),
                    (1, (1, 0, 1, 1)),
                    (1, (1, 0, 1, 2)),
                    (4, (1, 0, 1, 5)),
                ],
            );
            c.copy_single(4, 0, 0, 0)
                .and_then(|_| c.copy_single(0, 1, 1, 2))
                .and_then(|_| c.copy_single(0, 1, 1, 1))
                .map(|_| finish(c, &[1, 0, 1, 0, 0, 4]))
        }),
        // The same copies repeated.
        ("_4", {
            let mut c = DescriptorCommands::new(pipeline);
            add_all(
                &mut c,
                kind,
                &[(0, (1, 0, 1, 2)), (1, (1, 0, 1, 4)), (1, (1, 0, 1, 2))],
            );
            repeated_copies(&mut c).map(|_| finish(c, &[0, 1, 1]))
        }),
        // Back and forth.
        ("_5", {
            let mut c = DescriptorCommands::new(pipeline);
            add_all(
                &mut c,
                kind,
                &[(0, (1, 0, 1, 3)), (1, (1, 0, 1, 3)), (1, (1, 0, 1, 3))],
            );
            c.copy_single(0, 0, 1, 0)
                .and_then(|_| c.copy_single(1, 0, 0, 0))
                .and_then(|_| c.copy_single(1, 1, 0, 0))
                .and_then(|_| c.copy_single(1, 1, 0, 0))
                .and_then(|_| c.copy_single(1, 0, 1, 1))
                .map(|_| finish(c, &[1, 0, 0]))
        }),
        // Sets 1 to 4 stay empty.
        ("_6", {
            let mut c = DescriptorCommands::new(pipeline);
            add_all(
                &mut c,
                kind,
                &[(0, (1, 0, 1, 3)), (5, (1, 0, 1, 2)), (5, (1, 0, 1, 2))],
            );
            c.copy_single(0, 0, 5, 1).map(|_| finish(c, &[2, 1, 1]))
        }),
        ("_array0", {
            let mut c = DescriptorCommands::new(pipeline);
            add_all(&mut c, kind, &[(0, (3, 0, 3, 3)), (0, (3, 0, 3, 4))]);
            c.copy_descriptor(0, 0, 0, 0, 1, 0, 3)
                .map(|_| finish(c, &[1, 0, 2, 2, 1, 0]))
        }),
        ("_array1", {
            let mut c = DescriptorCommands::new(pipeline);
            add_all(&mut c, kind, &[(0, (2, 0, 2, 2)), (1, (3, 0, 3, 5))]);
            c.copy_descriptor(0, 0, 0, 1, 0, 0, 2)
                .map(|_| finish(c, &[1, 0, 1, 0, 1]))
        }),
        // Partly written by the host, partly by a copy.
        ("_array2", {
            let mut c = DescriptorCommands::new(pipeline);
            add_all(&mut c, kind, &[(0, (4, 0, 4, 3)), (0, (8, 0, 5, 4))]);
            c.copy_descriptor(0, 0, 1, 0, 1, 5, 3)
                .map(|_| finish(c, &[2, 0, 1, 1, 2, 0, 1, 2, 0, 1, 1, 2]))
        }),
    ]
}

pub fn sampler_cases(pipeline: PipelineType) -> Vec<(&'static str, Built)> {
    use DescriptorKind::{SampledImage, Sampler};
    vec![
        ("sampler_0", {
            let mut c = DescriptorCommands::new(pipeline);
            let mut sampler0 = c.single(Sampler);
            let mut sampler1 = c.single(Sampler);
            let image = c.single(SampledImage);
            sampler0.link(&image, 1);
            sampler1.link(&image, 1);
            c.add_descriptor(sampler0, 0);
            c.add_descriptor(sampler1, 0);
            c.add_descriptor(image, 0);
            c.copy_single(0, 0, 0, 1).map(|_| finish(c, &[]))
        }),
        ("sampler_array0", {
            let mut c = DescriptorCommands::new(pipeline);
            let mut sampler0 = c.descriptor(Sampler, 3, 0, 3, 1);
            // Shifts the ids so the border colors of sampler0 and sampler2
            // start out different.
            let sampler1 = c.single(Sampler);
            let mut sampler2 = c.descriptor(Sampler, 3, 0, 3, 1);
            let image = c.single(SampledImage);
            sampler0.link(&image, 3);
            sampler2.link(&image, 3);
            c.add_descriptor(sampler0, 0);
            c.add_descriptor(sampler1, 0);
            c.add_descriptor(sampler2, 0);
            c.add_descriptor(image, 0);
            c.copy_descriptor(0, 0, 0, 0, 2, 0, 3).map(|_| finish(c, &[]))
        }),
        ("sampler_array1", {
            let mut c = DescriptorCommands::new(pipeline);
            let mut sampler0 = c.descriptor(Sampler, 2, 0, 2, 1);
            let mut sampler1 = c.descriptor(Sampler, 3, 0, 3, 1);
            let image = c.single(SampledImage);
            sampler0.link(&image, 2);
            sampler1.link(&image, 3);
            c.add_descriptor(sampler0, 0);
            c.add_descriptor(sampler1, 1);
            c.add_descriptor(image, 0);
            c.copy_descriptor(0, 0, 0, 1, 0, 1, 2).map(|_| finish(c, &[]))
        }),
    ]
}

pub fn sampled_image_cases(pipeline: PipelineType) -> Vec<(&'static str, Built)> {
    use DescriptorKind::{SampledImage, Sampler};
    vec![
        ("sampled_image_0", {
            let mut c = DescriptorCommands::new(pipeline);
            let sampler = c.single(Sampler);
            let mut image0 = c.single(SampledImage);
            let mut image1 = c.single(SampledImage);
            image0.link(&sampler, 1);
            image1.link(&sampler, 1);
            c.add_descriptor(image0, 0);
            c.add_descriptor(image1, 0);
            c.add_descriptor(sampler, 0);
            c.copy_single(0, 0, 0, 1).map(|_| finish(c, &[]))
        }),
        ("sampled_image_array0", {
            let mut c = DescriptorCommands::new(pipeline);
            let sampler = c.single(Sampler);
            let mut image0 = c.descriptor(SampledImage, 3, 0, 3, 1);
            let mut image1 = c.descriptor(SampledImage, 3, 0, 3, 1);
            image0.link(&sampler, 3);
            image1.link(&sampler, 3);
            c.add_descriptor(sampler, 0);
            c.add_descriptor(image0, 0);
            c.add_descriptor(image1, 0);
            c.copy_descriptor(0, 1, 0, 0, 2, 0, 3).map(|_| finish(c, &[]))
        }),
    ]
}

/// Different descriptor kinds in the same sets. `mix_2` and `mix_3` use
/// input attachments and only exist for graphics.
pub fn mixed_cases(pipeline: PipelineType) -> Vec<(&'static str, Built)> {
    use DescriptorKind::*;
    let mut cases = Vec::new();

    cases.push(("mix_0", {
        let mut c = DescriptorCommands::new(pipeline);
        let mut sampler0 = c.single(Sampler);
        let mut sampler1 = c.single(Sampler);
        let image0 = c.single(SampledImage);
        let image1 = c.single(SampledImage);
        let storage0 = c.single(StorageBuffer);
        let storage1 = c.single(StorageBuffer);
        let storage2 = c.single(StorageBuffer);
        sampler0.link(&image0, 1);
        sampler1.link(&image1, 1);

        c.add_descriptor(sampler0, 0);
        c.add_descriptor(storage0, 0);
        c.add_descriptor(image0, 0);
        c.add_descriptor(storage1, 0);
        c.add_descriptor(sampler1, 1);
        c.add_descriptor(image1, 1);
        c.add_descriptor(storage2, 1);

        c.copy_single(1, 1, 0, 2)
            .and_then(|_| c.copy_single(0, 1, 0, 3))
            .and_then(|_| c.copy_single(0, 3, 1, 2))
            .map(|_| finish(c, &[]))
    }));

    cases.push(("mix_1", {
        let mut c = DescriptorCommands::new(pipeline);
        let texel0 = c.single(StorageTexelBuffer);
        let texel1 = c.single(StorageTexelBuffer);
        let uniform0 = c.single(UniformBuffer);
        let uniform1 = c.single(UniformBuffer);
        let uniform2 = c.single(UniformBuffer);
        let dynamic0 = c.descriptor(StorageBufferDynamic, 1, 0, 1, 3);
        let dynamic1 = c.descriptor(StorageBufferDynamic, 1, 0, 1, 4);

        c.add_descriptor(texel0, 0);
        c.add_descriptor(uniform0, 0);
        c.add_descriptor(dynamic0, 0);
        c.add_descriptor(uniform1, 0);
        c.add_descriptor(dynamic1, 1);
        c.add_descriptor(texel1, 1);
        c.add_descriptor(uniform2, 1);
        c.set_dynamic_areas(vec![2, 1]);

        c.copy_single(0, 1, 1, 2)
            .and_then(|_| c.copy_single(0, 3, 1, 2))
            .and_then(|_| c.copy_single(1, 1, 0, 0))
            .and_then(|_| c.copy_single(0, 2, 1, 0))
            .map(|_| {
                c.add_result_buffer();
                c
            })
    }));

    if pipeline == PipelineType::Graphics {
        cases.push(("mix_2", {
            let mut c = DescriptorCommands::new(pipeline);
            let input0 = c.single(InputAttachment);
            let input1 = c.single(InputAttachment);
            let combined0 = c.single(CombinedImageSampler);
            let combined1 = c.single(CombinedImageSampler);
            let texel0 = c.descriptor(UniformTexelBuffer, 5, 0, 5, 1);
            let texel1 = c.descriptor(UniformTexelBuffer, 3, 1, 1, 1);

            c.add_descriptor(combined0, 0);
            c.add_descriptor(input0, 0);
            c.add_descriptor(texel0, 0);
            c.add_descriptor(combined1, 1);
            c.add_descriptor(input1, 1);
            c.add_descriptor(texel1, 1);

            c.copy_descriptor(0, 2, 1, 1, 2, 0, 3)
                .and_then(|_| c.copy_single(0, 1, 1, 1))
                .and_then(|_| c.copy_single(0, 0, 1, 0))
                .map(|_| finish(c, &[]))
        }));

        cases.push(("mix_3", {
            let mut c = DescriptorCommands::new(pipeline);
            let iub0 = c.descriptor(InlineUniformBlock, 4, 0, 4, 1);
            let iub1 = c.descriptor(InlineUniformBlock, 4, 0, 1, 1);
            let input0 = c.single(InputAttachment);
            let input1 = c.single(InputAttachment);
            let combined0 = c.single(CombinedImageSampler);
            let combined1 = c.single(CombinedImageSampler);
            let texel0 = c.descriptor(UniformTexelBuffer, 5, 0, 5, 1);
            let texel1 = c.descriptor(UniformTexelBuffer, 3, 1, 1, 1);

            c.add_descriptor(iub0, 0);
            c.add_descriptor(combined0, 0);
            c.add_descriptor(input0, 0);
            c.add_descriptor(texel0, 0);
            c.add_descriptor(iub1, 1);
            c.add_descriptor(combined1, 1);
            c.add_descriptor(input1, 1);
            c.add_descriptor(texel1, 1);

            c.copy_descriptor(0, 0, 0, 1, 0, 1, 3)
                .and_then(|_| c.copy_descriptor(0, 3, 1, 1, 3, 0, 3))
                .and_then(|_| c.copy_single(0, 2, 1, 2))
                .and_then(|_| c.copy_single(0, 1, 1, 1))
                .map(|_| finish(c, &[]))
        }));
    }

    cases.push(("mix_array0", {
        let mut c = DescriptorCommands::new(pipeline);
        let combined0 = c.descriptor(CombinedImageSampler, 3, 0, 3, 1);
        let combined1 = c.descriptor(CombinedImageSampler, 4, 0, 2, 1);
        let combined2 = c.descriptor(CombinedImageSampler, 3, 0, 3, 1);
        let storage_image0 = c.descriptor(StorageImage, 5, 0, 5, 1);
        let storage_image1 = c.descriptor(StorageImage, 3, 0, 0, 1);
        let storage0 = c.descriptor(StorageBuffer, 2, 0, 1, 1);
        let storage1 = c.descriptor(StorageBuffer, 3, 0, 3, 1);

        c.add_descriptor(combined0, 0);
        c.add_descriptor(storage_image0, 0);
        c.add_descriptor(combined1, 0);
        c.add_descriptor(storage0, 0);
        c.add_descriptor(storage1, 0);
        c.add_descriptor(storage_image1, 1);
        c.add_descriptor(combined2, 1);

        c.copy_descriptor(0, 0, 1, 0, 2, 2, 2)
            .and_then(|_| c.copy_descriptor(0, 1, 2, 1, 0, 0, 3))
            .and_then(|_| c.copy_descriptor(0, 4, 1, 0, 3, 0, 2))
            .map(|_| finish(c, &[]))
    }));

    cases.push(("mix_array1", {
        let mut c = DescriptorCommands::new(pipeline);
        let iub0 = c.descriptor(InlineUniformBlock, 4, 0, 1, 1);
        let iub1 = c.descriptor(InlineUniformBlock, 4, 0, 4, 1);
        let combined0 = c.descriptor(CombinedImageSampler, 3, 0, 3, 1);
        let combined1 = c.descriptor(CombinedImageSampler, 4, 0, 2, 1);
        let combined2 = c.descriptor(CombinedImageSampler, 3, 0, 3, 1);
        let storage_image0 = c.descriptor(StorageImage, 5, 0, 5, 1);
        let storage_image1 = c.descriptor(StorageImage, 3, 0, 0, 1);
        let storage0 = c.descriptor(StorageBuffer, 2, 0, 1, 1);
        let storage1 = c.descriptor(StorageBuffer, 3, 0, 3, 1);

        c.add_descriptor(iub0, 0);
        c.add_descriptor(combined0, 0);
        c.add_descriptor(storage_image0, 0);
        c.add_descriptor(combined1, 0);
        c.add_descriptor(storage0, 0);
        c.add_descriptor(storage1, 0);
        c.add_descriptor(combined2, 0);
        c.add_descriptor(iub1, 1);
        c.add_descriptor(storage_image1, 1);

        c.copy_descriptor(1, 0, 0, 0, 0, 1, 3)
            .and_then(|_| c.copy_descriptor(0, 1, 1, 0, 3, 2, 2))
            .and_then(|_| c.copy_descriptor(0, 2, 2, 1, 1, 0, 3))
            .and_then(|_| c.copy_descriptor(0, 5, 1, 0, 4, 0, 2))
            .map(|_| finish(c, &[]))
    }));

    cases
}
