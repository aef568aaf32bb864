use super::classifier::{classify, classify_return, hfa_element, TypeClass};
use super::{
    Binding, Bindings, CallingSequence, Carrier, DowncallHandle, Error, FunctionDescriptor,
    IndirectResult, MemoryLayout, MethodType, Platform, RegisterClass, StorageCalculator,
    StorageChunk, UpcallStubFactory, VMStorage,
};
use crate::jvm::RenderDescriptor;
use log::debug;

/// Options of a call that aren't part of its signature
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct LinkerOptions {
    /// Arguments from this index onwards are the variadic part of the call
    pub first_variadic_index: Option<usize>,
}

impl LinkerOptions {
    pub fn variadic(first_variadic_index: usize) -> LinkerOptions {
        LinkerOptions {
            first_variadic_index: Some(first_variadic_index),
        }
    }

    pub fn is_variadic_function(&self) -> bool {
        self.first_variadic_index.is_some()
    }
}

/// Produces the binding program of one argument (or return value) at a time
trait BindingCalculator {
    fn get_bindings(
        &mut self,
        carrier: Carrier,
        layout: &MemoryLayout,
        variadic: bool,
    ) -> Result<Vec<Binding>, Error>;

    /// Storage for an address that isn't one of the arguments
    fn next_address_storage(&mut self) -> VMStorage;

    fn adjust_for_varargs(&mut self);
}

fn scalar_class(class: TypeClass) -> RegisterClass {
    if class == TypeClass::Float {
        RegisterClass::Float
    } else {
        RegisterClass::Integer
    }
}

/// Chunks of an aggregate passed by value
fn aggregate_chunks(
    storage: &mut StorageCalculator<'_>,
    class: TypeClass,
    layout: &MemoryLayout,
    platform: &Platform,
) -> Result<Vec<(StorageChunk, Carrier)>, Error> {
    let size = layout.byte_size();
    let alignment = layout.byte_alignment();
    if class == TypeClass::StructHfa {
        let (element, count) = hfa_element(layout, &platform.rules).ok_or_else(|| {
            Error::UnsupportedLayout(format!("{} is not a float aggregate", layout.render()))
        })?;
        let chunks = storage.hfa_storages(element, count, alignment);
        Ok(chunks
            .into_iter()
            .map(|chunk| {
                let carrier = match chunk.storage.register_class() {
                    Some(RegisterClass::Float) => Carrier::for_value(element),
                    _ => Carrier::for_chunk_size(chunk.size),
                };
                (chunk, carrier)
            })
            .collect())
    } else {
        Ok(storage
            .struct_storages(size, alignment)
            .into_iter()
            .map(|chunk| (chunk, Carrier::for_chunk_size(chunk.size)))
            .collect())
    }
}

/// Class of an argument, or of a return value when `storage` hands out return registers
fn classify_for(
    storage: &StorageCalculator<'_>,
    layout: &MemoryLayout,
    platform: &Platform,
    variadic: bool,
) -> Result<TypeClass, Error> {
    if storage.for_arguments() {
        classify(layout, &platform.rules, variadic)
    } else {
        classify_return(layout, &platform.rules)
    }
}

/// Size and alignment of what an address points to (unknown targets are empty)
fn pointee(layout: &MemoryLayout) -> (u64, u64) {
    match layout {
        MemoryLayout::Value(value) => match &value.target {
            Some(target) => (target.byte_size(), target.byte_alignment()),
            None => (0, 1),
        },
        _ => (0, 1),
    }
}

/// Moves managed values into native storage (downcall arguments, upcall returns)
struct UnboxBindingCalculator<'p> {
    platform: &'p Platform,
    storage: StorageCalculator<'p>,
}

impl<'p> BindingCalculator for UnboxBindingCalculator<'p> {
    fn get_bindings(
        &mut self,
        carrier: Carrier,
        layout: &MemoryLayout,
        variadic: bool,
    ) -> Result<Vec<Binding>, Error> {
        let class = classify_for(&self.storage, layout, self.platform, variadic)?;
        let mut bindings = vec![];
        match class {
            TypeClass::Integer | TypeClass::Float => {
                let storage = self.storage.next_storage(
                    scalar_class(class),
                    layout.byte_size(),
                    layout.byte_alignment(),
                );
                bindings.push(Binding::VmStore { storage, carrier });
            }
            TypeClass::Pointer => {
                let storage = self.storage.next_storage(RegisterClass::Integer, 8, 8);
                bindings.push(Binding::UnboxAddress);
                bindings.push(Binding::VmStore {
                    storage,
                    carrier: Carrier::Long,
                });
            }
            TypeClass::StructRegister | TypeClass::StructHfa => {
                let chunks = aggregate_chunks(&mut self.storage, class, layout, self.platform)?;
                let last = chunks.len().saturating_sub(1);
                for (index, (chunk, carrier)) in chunks.into_iter().enumerate() {
                    if index != last {
                        bindings.push(Binding::Dup);
                    }
                    bindings.push(Binding::BufferLoad {
                        offset: chunk.offset,
                        carrier,
                        byte_width: chunk.size,
                    });
                    bindings.push(Binding::VmStore {
                        storage: chunk.storage,
                        carrier,
                    });
                }
            }
            TypeClass::StructReference => {
                let storage = self.storage.next_storage(RegisterClass::Integer, 8, 8);
                bindings.push(Binding::Copy {
                    size: layout.byte_size(),
                    alignment: layout.byte_alignment(),
                });
                bindings.push(Binding::UnboxAddress);
                bindings.push(Binding::VmStore {
                    storage,
                    carrier: Carrier::Long,
                });
            }
        }
        debug!(
            "{} {:?} as {:?}: {:?}",
            layout.render(),
            carrier,
            class,
            bindings
        );
        Ok(bindings)
    }

    fn next_address_storage(&mut self) -> VMStorage {
        self.storage.next_storage(RegisterClass::Integer, 8, 8)
    }

    fn adjust_for_varargs(&mut self) {
        self.storage.adjust_for_varargs();
    }
}

/// Moves native storage into managed values (downcall returns, upcall arguments)
struct BoxBindingCalculator<'p> {
    platform: &'p Platform,
    storage: StorageCalculator<'p>,
}

impl<'p> BindingCalculator for BoxBindingCalculator<'p> {
    fn get_bindings(
        &mut self,
        carrier: Carrier,
        layout: &MemoryLayout,
        variadic: bool,
    ) -> Result<Vec<Binding>, Error> {
        let class = classify_for(&self.storage, layout, self.platform, variadic)?;
        let mut bindings = vec![];
        match class {
            TypeClass::Integer | TypeClass::Float => {
                let storage = self.storage.next_storage(
                    scalar_class(class),
                    layout.byte_size(),
                    layout.byte_alignment(),
                );
                bindings.push(Binding::VmLoad { storage, carrier });
            }
            TypeClass::Pointer => {
                let storage = self.storage.next_storage(RegisterClass::Integer, 8, 8);
                let (size, alignment) = pointee(layout);
                bindings.push(Binding::VmLoad {
                    storage,
                    carrier: Carrier::Long,
                });
                bindings.push(Binding::BoxAddress { size, alignment });
            }
            TypeClass::StructRegister | TypeClass::StructHfa => {
                bindings.push(Binding::Allocate {
                    size: layout.byte_size(),
                    alignment: layout.byte_alignment(),
                });
                for (chunk, carrier) in
                    aggregate_chunks(&mut self.storage, class, layout, self.platform)?
                {
                    bindings.push(Binding::Dup);
                    bindings.push(Binding::VmLoad {
                        storage: chunk.storage,
                        carrier,
                    });
                    bindings.push(Binding::BufferStore {
                        offset: chunk.offset,
                        carrier,
                        byte_width: chunk.size,
                    });
                }
            }
            TypeClass::StructReference => {
                let storage = self.storage.next_storage(RegisterClass::Integer, 8, 8);
                bindings.push(Binding::VmLoad {
                    storage,
                    carrier: Carrier::Long,
                });
                bindings.push(Binding::BoxAddress {
                    size: layout.byte_size(),
                    alignment: layout.byte_alignment(),
                });
            }
        }
        debug!(
            "{} {:?} as {:?}: {:?}",
            layout.render(),
            carrier,
            class,
            bindings
        );
        Ok(bindings)
    }

    fn next_address_storage(&mut self) -> VMStorage {
        self.storage.next_storage(RegisterClass::Integer, 8, 8)
    }

    fn adjust_for_varargs(&mut self) {
        self.storage.adjust_for_varargs();
    }
}

/// Arranges calls according to one platform's calling convention
#[derive(Copy, Clone, Debug)]
pub struct CallArranger<'p> {
    platform: &'p Platform,
}

impl<'p> CallArranger<'p> {
    pub fn new(platform: &'p Platform) -> CallArranger<'p> {
        CallArranger { platform }
    }

    pub fn platform(&self) -> &'p Platform {
        self.platform
    }

    fn check_signature(
        method_type: &MethodType,
        descriptor: &FunctionDescriptor,
        options: &LinkerOptions,
    ) -> Result<(), Error> {
        if method_type.parameters.len() != descriptor.arity() {
            return Err(Error::ParameterCountMismatch {
                expected: descriptor.arity(),
                found: method_type.parameters.len(),
            });
        }
        for (index, (carrier, layout)) in method_type
            .parameters
            .iter()
            .zip(&descriptor.arguments)
            .enumerate()
        {
            let expected = Carrier::for_layout(layout)?;
            if *carrier != expected {
                return Err(Error::CarrierMismatch {
                    index: Some(index),
                    expected,
                    found: *carrier,
                });
            }
        }

        let expected = descriptor
            .return_layout
            .as_ref()
            .map(Carrier::for_layout)
            .transpose()?;
        match (expected, method_type.return_type) {
            (Some(expected), Some(found)) if expected != found => {
                return Err(Error::CarrierMismatch {
                    index: None,
                    expected,
                    found,
                })
            }
            (expected, found) if expected.is_some() != found.is_some() => {
                return Err(Error::ReturnMismatch { expected, found })
            }
            _ => (),
        }

        match options.first_variadic_index {
            Some(index) if index > descriptor.arity() => Err(Error::InvalidVariadicIndex {
                index,
                arity: descriptor.arity(),
            }),
            _ => Ok(()),
        }
    }

    /// Bindings of every argument and of the return value
    ///
    /// For a downcall, arguments are unboxed into native storage and the return value is boxed
    /// back. Upcalls are the mirror image.
    pub fn get_bindings(
        &self,
        method_type: &MethodType,
        descriptor: &FunctionDescriptor,
        for_upcall: bool,
        options: &LinkerOptions,
    ) -> Result<Bindings, Error> {
        CallArranger::check_signature(method_type, descriptor, options)?;

        let unbox = |for_arguments| UnboxBindingCalculator {
            platform: self.platform,
            storage: StorageCalculator::new(self.platform, for_arguments),
        };
        let boxing = |for_arguments| BoxBindingCalculator {
            platform: self.platform,
            storage: StorageCalculator::new(self.platform, for_arguments),
        };
        let (mut arguments, mut returns): (
            Box<dyn BindingCalculator + 'p>,
            Box<dyn BindingCalculator + 'p>,
        ) = if for_upcall {
                (Box::new(boxing(true)), Box::new(unbox(false)))
            } else {
                (Box::new(unbox(true)), Box::new(boxing(false)))
            };

        let mut calling_method_type = method_type.clone();
        let mut calling_descriptor = descriptor.clone();
        let mut argument_bindings = vec![];
        let mut return_bindings = vec![];
        let mut return_in_memory = None;

        if let Some(return_layout) = &descriptor.return_layout {
            let class = classify_return(return_layout, &self.platform.rules)?;
            if class == TypeClass::StructReference {
                let storage = match self.platform.rules.indirect_result {
                    IndirectResult::DedicatedRegister(register) => register,
                    IndirectResult::LeadingArgument => arguments.next_address_storage(),
                };
                debug!(
                    "{} returned in memory, buffer address in {}",
                    return_layout.render(),
                    storage
                );
                let buffer = if for_upcall {
                    vec![
                        Binding::VmLoad {
                            storage,
                            carrier: Carrier::Long,
                        },
                        Binding::BoxAddress {
                            size: return_layout.byte_size(),
                            alignment: return_layout.byte_alignment(),
                        },
                    ]
                } else {
                    vec![
                        Binding::UnboxAddress,
                        Binding::VmStore {
                            storage,
                            carrier: Carrier::Long,
                        },
                    ]
                };
                argument_bindings.push(buffer);

                calling_method_type.parameters.insert(0, Carrier::Address);
                calling_method_type.return_type = None;
                calling_descriptor
                    .arguments
                    .insert(0, MemoryLayout::address_to(return_layout.clone()));
                calling_descriptor.return_layout = None;
                return_in_memory = Some(return_layout.clone());
            } else if let Some(carrier) = method_type.return_type {
                return_bindings = returns.get_bindings(carrier, return_layout, false)?;
            }
        }

        let first_variadic = options.first_variadic_index;
        for (index, (carrier, layout)) in method_type
            .parameters
            .iter()
            .zip(&descriptor.arguments)
            .enumerate()
        {
            if first_variadic == Some(index) {
                arguments.adjust_for_varargs();
            }
            let variadic = first_variadic.map_or(false, |first| index >= first);
            argument_bindings.push(arguments.get_bindings(*carrier, layout, variadic)?);
        }

        let shift = usize::from(return_in_memory.is_some());
        let is_in_memory_return = return_in_memory.is_some();
        Ok(Bindings {
            calling_sequence: CallingSequence {
                for_upcall,
                method_type: calling_method_type,
                descriptor: calling_descriptor,
                argument_bindings,
                return_bindings,
                return_in_memory,
                first_variadic: first_variadic.map(|index| index + shift),
            },
            is_in_memory_return,
        })
    }

    /// Handle for calling a native function from managed code
    pub fn arrange_downcall(
        &self,
        method_type: &MethodType,
        descriptor: &FunctionDescriptor,
        options: &LinkerOptions,
    ) -> Result<DowncallHandle, Error> {
        let bindings = self.get_bindings(method_type, descriptor, false, options)?;
        Ok(DowncallHandle::new(bindings))
    }

    /// Factory of native entry points that call managed functions
    pub fn arrange_upcall(
        &self,
        method_type: &MethodType,
        descriptor: &FunctionDescriptor,
        options: &LinkerOptions,
    ) -> Result<UpcallStubFactory, Error> {
        let bindings = self.get_bindings(method_type, descriptor, true, options)?;
        Ok(UpcallStubFactory::new(bindings))
    }
}
