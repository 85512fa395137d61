//! The `Result<Size, Errno>` wire encoding used by every `sf_host_unstable`
//! export, and the WASI preview-1 errno subset the runtime surfaces.

/// WASI preview-1 errno values the runtime is able to produce.
///
/// Not every preview-1 errno is reachable from this host; the full
/// enumeration is kept so that a guest decoding an arbitrary `Errno` value
/// never meets an unknown discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
	Success = 0,
	TooBig = 1,
	Access = 2,
	AddrInUse = 3,
	AddrNotAvail = 4,
	AfNoSupport = 5,
	Again = 6,
	Already = 7,
	Badf = 8,
	BadMsg = 9,
	Busy = 10,
	Canceled = 11,
	Child = 12,
	ConnAborted = 13,
	ConnRefused = 14,
	ConnReset = 15,
	Deadlk = 16,
	DestAddrReq = 17,
	Dom = 18,
	Dquot = 19,
	Exist = 20,
	Fault = 21,
	Fbig = 22,
	HostUnreach = 23,
	Idrm = 24,
	Ilseq = 25,
	InProgress = 26,
	Intr = 27,
	Inval = 28,
	Io = 29,
	IsConn = 30,
	IsDir = 31,
	Loop = 32,
	Mfile = 33,
	Mlink = 34,
	MsgSize = 35,
	Multihop = 36,
	NameTooLong = 37,
	NetDown = 38,
	NetReset = 39,
	NetUnreach = 40,
	Nfile = 41,
	NoBufs = 42,
	NoDev = 43,
	NoEnt = 44,
	NoExec = 45,
	NoLck = 46,
	NoLink = 47,
	NoMem = 48,
	NoMsg = 49,
	NoProtoOpt = 50,
	NoSpc = 51,
	NoSys = 52,
	NotConn = 53,
	NotDir = 54,
	NotEmpty = 55,
	NotRecoverable = 56,
	NotSock = 57,
	NotSup = 58,
	NotTy = 59,
	Nxio = 60,
	Overflow = 61,
	OwnerDead = 62,
	Perm = 63,
	Pipe = 64,
	Proto = 65,
	ProtoNoSupport = 66,
	ProtoType = 67,
	Range = 68,
	Rofs = 69,
	Spipe = 70,
	Srch = 71,
	Stale = 72,
	TimedOut = 73,
	TxtBsy = 74,
	Xdev = 75,
	NotCapable = 76,
}

/// The 32-bit return word of a `sf_host_unstable` export: the top bit is the
/// `Ok`/`Err` discriminant, the low 31 bits carry the payload.
pub type AbiWord = i32;

const DISCRIMINANT_BIT: i32 = 1 << 31;
const PAYLOAD_MASK: i32 = !DISCRIMINANT_BIT;

/// Packs a successful `size` payload into the ABI word.
pub fn abi_ok(size: i32) -> AbiWord {
	size & PAYLOAD_MASK
}

/// Packs an `errno` into the ABI word's error form.
pub fn abi_err(errno: Errno) -> AbiWord {
	((errno as i32) & PAYLOAD_MASK) | DISCRIMINANT_BIT
}

/// Unpacks an ABI word into `Ok(size)` or `Err(raw_errno)`.
pub fn abi_unpack(word: AbiWord) -> Result<i32, i32> {
	if word & DISCRIMINANT_BIT == 0 {
		Ok(word & PAYLOAD_MASK)
	} else {
		Err(word & PAYLOAD_MASK)
	}
}
