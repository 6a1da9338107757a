//! `vkCmdFillBuffer` / `vkCmdUpdateBuffer` on host-visible buffers, on the
//! universal queue or on a transfer-only queue of a dedicated device.

use ash::vk;
use cts_core::{CtsError, TestGroup, TestStatus};
use cts_vk::command::{
    allocate_command_buffer, begin_command_buffer, buffer_barrier, cmd_buffer_barrier,
    create_command_pool, end_command_buffer, submit_commands_and_wait,
};
use cts_vk::{BinaryCollection, BufferWithMemory, Context, CustomDevice, TestCase, TestInstance};
use tracing::debug;

use crate::registry::CaseBox;

pub const TEST_DATA_WORDS: usize = 256;
const SENTINEL: u8 = 0xff;
const MAX_UPDATE_SIZE: u64 = 65536;

/// `test_data[i] = 0x01010101 * (i + 1)`, wrapping.
pub fn test_data() -> [u32; TEST_DATA_WORDS] {
    let mut data = [0u32; TEST_DATA_WORDS];
    for (i, word) in data.iter_mut().enumerate() {
        *word = 0x0101_0101u32.wrapping_mul(i as u32 + 1);
    }
    data
}

// ── Reference model ─────────────────────────────────────────────────────────

/// Exclusive end of a `VK_WHOLE_SIZE` fill: trailing bytes that do not make
/// up a whole word are left untouched.
pub fn whole_size_fill_end(dst_size: u64, offset: u64) -> u64 {
    offset + (dst_size.saturating_sub(offset) / 4) * 4
}

pub fn fill_reference(initial: &[u8], offset: u64, size: u64, pattern: u32) -> Vec<u8> {
    let mut out = initial.to_vec();
    let end = if size == vk::WHOLE_SIZE {
        whole_size_fill_end(initial.len() as u64, offset)
    } else {
        offset + size
    };
    let pattern = pattern.to_ne_bytes();
    for i in offset as usize..(end as usize).min(out.len()) {
        out[i] = pattern[(i - offset as usize) % 4];
    }
    out
}

pub fn update_reference(initial: &[u8], offset: u64, data: &[u8]) -> Vec<u8> {
    let mut out = initial.to_vec();
    let start = offset as usize;
    let end = (start + data.len()).min(out.len());
    out[start..end].copy_from_slice(&data[..end - start]);
    out
}

/// Index of the first differing byte.
pub fn compare_bytes(expected: &[u8], actual: &[u8]) -> Option<usize> {
    expected
        .iter()
        .zip(actual)
        .position(|(e, a)| e != a)
        .or_else(|| (expected.len() != actual.len()).then(|| expected.len().min(actual.len())))
}

// ── Case ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOp {
    Fill,
    Update,
}

#[derive(Debug, Clone)]
pub struct FillBufferParams {
    pub op: BufferOp,
    pub dst_size: u64,
    pub dst_offset: u64,
    /// Byte count, or `vk::WHOLE_SIZE` for fills.
    pub size: u64,
    pub use_transfer_queue: bool,
}

impl FillBufferParams {
    /// `vkCmdUpdateBuffer` takes a multiple of 4 bytes, at most 65536 and
    /// no more than the test data holds.
    pub fn validate(&self) -> Result<(), CtsError> {
        if self.op == BufferOp::Update {
            let available = (TEST_DATA_WORDS * 4) as u64;
            if self.size > MAX_UPDATE_SIZE || self.size % 4 != 0 || self.size > available {
                return Err(CtsError::fatal(format!(
                    "vkCmdUpdateBuffer size {} must be a multiple of 4 no larger than {}",
                    self.size,
                    available.min(MAX_UPDATE_SIZE)
                )));
            }
        }
        Ok(())
    }

    /// Bytes the reference model expects after the operation.
    pub fn expected_bytes(&self) -> Vec<u8> {
        let initial = vec![SENTINEL; self.dst_size as usize];
        let data = test_data();
        match self.op {
            BufferOp::Fill => fill_reference(&initial, self.dst_offset, self.size, data[0]),
            BufferOp::Update => {
                let bytes: &[u8] = bytemuck::cast_slice(&data);
                update_reference(&initial, self.dst_offset, &bytes[..self.size as usize])
            }
        }
    }
}

pub struct FillBufferCase {
    params: FillBufferParams,
}

impl FillBufferCase {
    /// Bad parameters surface as an internal error when the case runs.
    pub fn new(params: FillBufferParams) -> Self {
        Self { params }
    }
}

fn transfer_only_family(context: &Context) -> Result<u32, CtsError> {
    context
        .find_queue_family(
            vk::QueueFlags::TRANSFER,
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
        )
        .ok_or_else(|| {
            CtsError::not_supported("No queue family found that only supports transfer queue.")
        })
}

impl TestCase for FillBufferCase {
    fn check_support(&self, context: &Context) -> Result<(), CtsError> {
        self.params.validate()?;
        if self.params.use_transfer_queue {
            transfer_only_family(context)?;
        }
        Ok(())
    }

    fn create_instance<'a>(
        &self,
        context: &'a Context,
        _binaries: &'a BinaryCollection,
    ) -> Result<Box<dyn TestInstance + 'a>, CtsError> {
        let custom = if self.params.use_transfer_queue {
            let family = transfer_only_family(context)?;
            Some(context.custom_device().queue_family(family, 1).build()?)
        } else {
            None
        };
        Ok(Box::new(FillBufferInstance {
            params: self.params.clone(),
            context,
            custom,
        }))
    }
}

struct FillBufferInstance<'a> {
    params: FillBufferParams,
    context: &'a Context,
    custom: Option<CustomDevice>,
}

impl TestInstance for FillBufferInstance<'_> {
    fn iterate(&mut self) -> Result<TestStatus, CtsError> {
        let (device, allocator, queue, family) = match &self.custom {
            Some(custom) => {
                let q = custom
                    .queue()
                    .ok_or_else(|| CtsError::fatal("custom device has no queue"))?;
                (custom.device(), custom.allocator(), q.queue, q.family_index)
            }
            None => (
                self.context.device(),
                self.context.allocator(),
                self.context.universal_queue(),
                self.context.universal_queue_family_index(),
            ),
        };
        let p = &self.params;

        let mut buffer = BufferWithMemory::host_visible(
            allocator,
            p.dst_size,
            vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
        )?;
        buffer.bytes_mut().fill(SENTINEL);
        buffer.allocation().flush()?;

        let pool = create_command_pool(device, family, vk::CommandPoolCreateFlags::empty())?;
        let cmd = allocate_command_buffer(device, pool.get(), vk::CommandBufferLevel::PRIMARY)?;
        begin_command_buffer(device, cmd)?;

        let data = test_data();
        match p.op {
            BufferOp::Fill => unsafe {
                device.cmd_fill_buffer(cmd, buffer.buffer(), p.dst_offset, p.size, data[0])
            },
            BufferOp::Update => {
                let bytes: &[u8] = bytemuck::cast_slice(&data);
                unsafe {
                    device.cmd_update_buffer(
                        cmd,
                        buffer.buffer(),
                        p.dst_offset,
                        &bytes[..p.size as usize],
                    )
                }
            }
        }
        cmd_buffer_barrier(
            device,
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::HOST,
            buffer_barrier(buffer.buffer(), vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::HOST_READ),
        );
        end_command_buffer(device, cmd)?;
        submit_commands_and_wait(device, queue, cmd)?;

        buffer.allocation().invalidate()?;
        let expected = p.expected_bytes();
        debug!("comparing {} bytes", expected.len());
        match compare_bytes(&expected, buffer.bytes()) {
            Some(i) => Ok(TestStatus::fail(format!(
                "Buffer mismatch at byte {}: expected 0x{:02x}, got 0x{:02x}",
                i,
                expected.get(i).copied().unwrap_or(0),
                buffer.bytes().get(i).copied().unwrap_or(0)
            ))),
            None => Ok(TestStatus::pass("Fill and update buffer test passed")),
        }
    }
}

// ── Groups ──────────────────────────────────────────────────────────────────

const SIZED_CASES: [(&str, u64, u64, u64); 4] = [
    ("whole", 1024, 0, 1024),
    ("first_one", 1024, 0, 4),
    ("second_one", 1024, 4, 4),
    ("second_part", 1024, 512, 256),
];

/// Names and parameters of one queue's worth of cases.
pub fn case_params(use_transfer_queue: bool) -> Vec<(String, FillBufferParams)> {
    let mut cases = Vec::new();
    for (extra, offset) in (0..4u64).flat_map(|e| [0u64, 4, 8].map(move |o| (e, o))) {
        cases.push((
            format!("fill_buffer_vk_whole_size_{}_extra_bytes_offset_{}", extra, offset),
            FillBufferParams {
                op: BufferOp::Fill,
                dst_size: 256 + extra,
                dst_offset: offset,
                size: vk::WHOLE_SIZE,
                use_transfer_queue,
            },
        ));
    }

    for (op, prefix) in [(BufferOp::Fill, "fill_buffer"), (BufferOp::Update, "update_buffer")] {
        for (name, dst_size, dst_offset, size) in SIZED_CASES {
            cases.push((
                format!("{}_{}", prefix, name),
                FillBufferParams {
                    op,
                    dst_size,
                    dst_offset,
                    size,
                    use_transfer_queue,
                },
            ));
        }
    }
    cases
}

fn add_cases(group: &mut TestGroup<CaseBox>, use_transfer_queue: bool) {
    for (name, params) in case_params(use_transfer_queue) {
        group.add_case(name, Box::new(FillBufferCase::new(params)));
    }
}

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut root = TestGroup::new("fill_and_update_buffer", "Fill and Update Buffer Tests");

    let mut suballocation = TestGroup::new("suballocation", "BufferView Fill and Update Tests for Suballocated Objects");
    add_cases(&mut suballocation, false);
    root.add_child(suballocation);

    let mut transfer = TestGroup::new(
        "suballocation_transfer_queue",
        "BufferView Fill and Update Tests for Suballocated Objects on a transfer-only queue",
    );
    add_cases(&mut transfer, true);
    root.add_child(transfer);

    root
}
